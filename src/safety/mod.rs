//! 安全层：危险模式筛查、策略检查与结果脱敏

pub mod gate;
pub mod patterns;

pub use gate::SafetyGate;
pub use patterns::{DangerousPatterns, Redactor};
