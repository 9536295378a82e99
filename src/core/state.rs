//! Queen 状态机
//!
//! idle → analyzing → orchestrating → consolidating → completed；任一非 idle 状态可因不可恢复错误进入 failed。

use serde::Serialize;

use crate::core::error::OrchestrationError;

/// 单次编排运行的阶段
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueenState {
    #[default]
    Idle,
    /// 调用 Planner
    Analyzing,
    /// 配置、生成集群、调度执行
    Orchestrating,
    /// 汇总并销毁沙箱
    Consolidating,
    Completed,
    Failed,
}

impl QueenState {
    pub fn is_terminal(self) -> bool {
        matches!(self, QueenState::Completed | QueenState::Failed)
    }

    pub fn can_transition_to(self, next: QueenState) -> bool {
        use QueenState::{Analyzing, Completed, Consolidating, Failed, Idle, Orchestrating};
        match (self, next) {
            (Idle, Analyzing)
            | (Analyzing, Orchestrating)
            | (Orchestrating, Consolidating)
            | (Consolidating, Completed) => true,
            (Analyzing | Orchestrating | Consolidating, Failed) => true,
            _ => false,
        }
    }

    /// 校验后返回新状态；非法转换返回 InvalidTransition
    pub fn transition(self, next: QueenState) -> Result<QueenState, OrchestrationError> {
        if self.can_transition_to(next) {
            tracing::debug!(from = ?self, to = ?next, "queen state transition");
            Ok(next)
        } else {
            Err(OrchestrationError::InvalidTransition { from: self, to: next })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let s = QueenState::Idle
            .transition(QueenState::Analyzing)
            .and_then(|s| s.transition(QueenState::Orchestrating))
            .and_then(|s| s.transition(QueenState::Consolidating))
            .and_then(|s| s.transition(QueenState::Completed))
            .unwrap();
        assert!(s.is_terminal());
    }

    #[test]
    fn test_failed_not_reachable_from_idle() {
        assert!(QueenState::Idle.transition(QueenState::Failed).is_err());
        assert!(QueenState::Analyzing.transition(QueenState::Failed).is_ok());
        assert!(QueenState::Consolidating.transition(QueenState::Failed).is_ok());
    }

    #[test]
    fn test_cannot_skip_phases() {
        assert!(QueenState::Idle.transition(QueenState::Orchestrating).is_err());
        assert!(QueenState::Completed.transition(QueenState::Analyzing).is_err());
    }
}
