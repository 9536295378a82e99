//! 核心编排层：错误、状态机、运行监管、结果汇总与 Queen 主控

pub mod builder;
pub mod consolidator;
pub mod error;
pub mod orchestrator;
pub mod session_supervisor;
pub mod state;

pub use builder::QueenBuilder;
pub use consolidator::{Consolidator, OrchestrationResult, SUMMARY_PLACEHOLDER};
pub use error::OrchestrationError;
pub use orchestrator::{Queen, SwarmRun};
pub use session_supervisor::SessionSupervisor;
pub use state::QueenState;
