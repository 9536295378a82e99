//! 编排错误类型
//!
//! 规划 / 集群生成失败会终止整次运行；安全闸门拒绝与单任务失败在本地恢复（任务标记 failed，兄弟任务不受影响）；
//! ExecutionFailed 与 SummarizationFailed 不会终止运行，汇总阶段照常进行。

use thiserror::Error;

use crate::core::state::QueenState;

/// 编排过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("Invalid goal: {0}")]
    InvalidGoal(String),

    /// 外部规划调用失败（本层不重试）
    #[error("Planning failed: {0}")]
    PlanningFailed(String),

    /// 沙箱创建失败，已创建的沙箱已回滚
    #[error("Cluster spawn failed: {0}")]
    ClusterSpawnFailed(String),

    #[error("Operation not allowed: {0}")]
    OperationNotAllowed(String),

    #[error("Resource limit exceeded: {0}")]
    ResourceLimitExceeded(String),

    #[error("Dangerous operation: {0}")]
    DangerousOperation(String),

    /// 某个依赖组内出现不可恢复错误后的聚合错误
    #[error("Execution failed: {}", .0.join("; "))]
    ExecutionFailed(Vec<String>),

    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("Orchestration cancelled")]
    Cancelled,

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: QueenState, to: QueenState },
}

impl OrchestrationError {
    /// 是否应终止整次运行（没有计划或没有 Agent 就无法执行）
    pub fn aborts_run(&self) -> bool {
        matches!(
            self,
            OrchestrationError::InvalidGoal(_)
                | OrchestrationError::PlanningFailed(_)
                | OrchestrationError::ClusterSpawnFailed(_)
                | OrchestrationError::InvalidTransition { .. }
        )
    }
}
