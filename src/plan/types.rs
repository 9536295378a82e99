//! 计划类型定义
//!
//! MasterPlan → Phase → MicroTask；任务依赖、任务状态机与任务结果。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sandbox::Operation;
use crate::swarm::Specialization;

pub type PlanId = String;
pub type PhaseId = String;
pub type TaskId = String;

/// 阶段复杂度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" | "simple" | "easy" => Some(Complexity::Low),
            "medium" | "moderate" | "normal" => Some(Complexity::Medium),
            "high" | "complex" | "hard" => Some(Complexity::High),
            _ => None,
        }
    }
}

/// 任务状态：pending → assigned → in_progress → completed | failed | blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    /// 本次运行无法调度（无匹配 Agent、依赖未终结或依赖无效），不自动重试
    Blocked,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// 合法的状态迁移；未分配前只能被拒绝（failed）或阻塞
    pub fn can_advance_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned | Failed | Blocked)
                | (Assigned, InProgress | Failed)
                | (InProgress, Completed | Failed)
        )
    }
}

/// 任务结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Failed,
}

/// 任务结果：每个任务追加一次；内容经安全闸门 post_check 脱敏后才记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub agent_id: String,
    pub status: ResultStatus,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl TaskResult {
    pub fn success(task_id: impl Into<TaskId>, agent_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            status: ResultStatus::Success,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn failed(task_id: impl Into<TaskId>, agent_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Failed,
            ..Self::success(task_id, agent_id, content)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }
}

/// 最小工作单元
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicroTask {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub task_type: Specialization,
    /// 执行所需操作（由安全闸门对照沙箱策略检查）
    pub operation: Operation,
    /// 1..=5
    pub effort: u8,
    pub estimated_duration: String,
    pub dependencies: Vec<TaskId>,
    pub deliverable: Option<String>,
    /// execute 类任务的具体命令，须命中沙箱命令白名单
    pub command: Option<String>,
    pub assigned_agent: Option<String>,
    pub result: Option<TaskResult>,
    pub status: TaskStatus,
}

impl MicroTask {
    pub const MIN_EFFORT: u8 = 1;
    pub const MAX_EFFORT: u8 = 5;

    pub fn new(id: impl Into<TaskId>, title: impl Into<String>, task_type: Specialization) -> Self {
        let title = title.into();
        Self {
            id: id.into(),
            description: title.clone(),
            title,
            task_type,
            operation: task_type.default_operation(),
            effort: 2,
            estimated_duration: "30m".to_string(),
            dependencies: Vec::new(),
            deliverable: None,
            command: None,
            assigned_agent: None,
            result: None,
            status: TaskStatus::Pending,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }

    pub fn with_effort(mut self, effort: i64) -> Self {
        self.effort = effort.clamp(Self::MIN_EFFORT as i64, Self::MAX_EFFORT as i64) as u8;
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<TaskId>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_deliverable(mut self, deliverable: impl Into<String>) -> Self {
        self.deliverable = Some(deliverable.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// 按状态机迁移；非法迁移不改变状态并返回 false
    pub fn advance(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_advance_to(next) {
            tracing::warn!(task_id = %self.id, from = ?self.status, to = ?next, "Illegal task status transition");
            return false;
        }
        self.status = next;
        true
    }
}

/// 阶段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub id: PhaseId,
    pub name: String,
    pub tasks: Vec<MicroTask>,
    pub complexity: Complexity,
    pub primary_type: Specialization,
}

/// 任务依赖边：task_id 依赖 depends_on 中的所有任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub task_id: TaskId,
    pub depends_on: Vec<TaskId>,
}

/// 总计划：每次运行由 Planner 创建一次，此后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterPlan {
    pub id: PlanId,
    pub goal: String,
    pub phases: Vec<Phase>,
    pub dependencies: Vec<TaskDependency>,
    pub estimated_duration: String,
    pub success_criteria: Vec<String>,
}

impl MasterPlan {
    /// 由阶段构建计划，依赖边从任务的 dependencies 派生
    pub fn new(goal: impl Into<String>, phases: Vec<Phase>) -> Self {
        let dependencies = phases
            .iter()
            .flat_map(|p| p.tasks.iter())
            .filter(|t| !t.dependencies.is_empty())
            .map(|t| TaskDependency {
                task_id: t.id.clone(),
                depends_on: t.dependencies.clone(),
            })
            .collect();
        Self {
            id: format!("plan_{}", uuid::Uuid::new_v4()),
            goal: goal.into(),
            phases,
            dependencies,
            estimated_duration: String::new(),
            success_criteria: Vec::new(),
        }
    }

    pub fn tasks(&self) -> impl Iterator<Item = &MicroTask> {
        self.phases.iter().flat_map(|p| p.tasks.iter())
    }

    pub fn task_count(&self) -> usize {
        self.phases.iter().map(|p| p.tasks.len()).sum()
    }

    pub fn task(&self, id: &str) -> Option<&MicroTask> {
        self.tasks().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effort_is_clamped() {
        assert_eq!(MicroTask::new("t", "x", Specialization::Code).with_effort(9).effort, 5);
        assert_eq!(MicroTask::new("t", "x", Specialization::Code).with_effort(-3).effort, 1);
    }

    #[test]
    fn test_default_operation_follows_specialization() {
        assert_eq!(MicroTask::new("t", "x", Specialization::Code).operation, Operation::Write);
        assert_eq!(MicroTask::new("t", "x", Specialization::Review).operation, Operation::Analyze);
    }

    #[test]
    fn test_plan_derives_dependency_edges() {
        let phase = Phase {
            id: "p1".into(),
            name: "Build".into(),
            complexity: Complexity::Medium,
            primary_type: Specialization::Code,
            tasks: vec![
                MicroTask::new("a", "A", Specialization::Code),
                MicroTask::new("b", "B", Specialization::Test).with_dependencies(vec!["a".into()]),
            ],
        };
        let plan = MasterPlan::new("goal", vec![phase]);
        assert_eq!(plan.task_count(), 2);
        assert_eq!(
            plan.dependencies,
            vec![TaskDependency { task_id: "b".into(), depends_on: vec!["a".into()] }]
        );
        assert!(plan.task("b").is_some());
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
    }

    #[test]
    fn test_lifecycle_passes_through_assigned() {
        assert!(TaskStatus::Pending.can_advance_to(TaskStatus::Assigned));
        assert!(TaskStatus::Assigned.can_advance_to(TaskStatus::InProgress));
        assert!(TaskStatus::InProgress.can_advance_to(TaskStatus::Completed));
        assert!(!TaskStatus::Pending.can_advance_to(TaskStatus::InProgress));
        assert!(!TaskStatus::Pending.can_advance_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_advance_to(TaskStatus::Failed));
        assert!(!TaskStatus::Blocked.can_advance_to(TaskStatus::Assigned));
    }

    #[test]
    fn test_advance_refuses_skipping_assignment() {
        let mut task = MicroTask::new("t", "x", Specialization::Code);
        assert!(!task.advance(TaskStatus::InProgress));
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.advance(TaskStatus::Assigned));
        assert!(task.advance(TaskStatus::InProgress));
        assert!(task.advance(TaskStatus::Completed));
        assert!(!task.advance(TaskStatus::Failed));
        assert_eq!(task.status, TaskStatus::Completed);
    }
}
