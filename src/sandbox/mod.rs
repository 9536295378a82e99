//! 沙箱层：不可变策略与沙箱生命周期管理

pub mod manager;
pub mod policy;

pub use manager::{InMemorySandboxManager, Sandbox, SandboxError, SandboxId, SandboxManager};
pub use policy::{FsAccess, Operation, ResourceLimits, SandboxPolicy};
