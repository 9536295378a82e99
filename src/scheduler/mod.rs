//! 调度层：依赖分组与按组并发执行

pub mod executor;
pub mod groups;

pub use executor::{ExecutionReport, ExecutionScheduler};
pub use groups::{dependency_groups, DependencyGroups, Unschedulable};
