//! 计划层：MasterPlan 数据模型与 Planner

pub mod planner;
pub mod types;

pub use planner::Planner;
pub use types::{
    Complexity, MasterPlan, MicroTask, Phase, PhaseId, PlanId, ResultStatus, TaskDependency,
    TaskId, TaskResult, TaskStatus,
};
