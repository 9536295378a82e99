//! 工作者 Agent：绑定一个专属沙箱，在超时内通过 TaskRunner 执行任务
//!
//! 每次执行输出结构化审计日志（JSON），并累计资源使用（执行次数、忙碌时长、内存）。

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::time::timeout;

use crate::plan::{MicroTask, TaskResult};
use crate::sandbox::Sandbox;
use crate::swarm::Specialization;
use crate::worker::{RunnerError, TaskOutput, TaskRunner};

pub type AgentId = String;

/// Agent 状态：idle → assigned → working → completed | failed | terminated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Assigned,
    Working,
    Completed,
    Failed,
    Terminated,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Assigned => "assigned",
            AgentStatus::Working => "working",
            AgentStatus::Completed => "completed",
            AgentStatus::Failed => "failed",
            AgentStatus::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
    pub memory_mb: u64,
    pub tasks_executed: u32,
    pub busy_ms: u64,
}

#[derive(Debug)]
pub struct Agent {
    pub id: AgentId,
    /// 展示名；加入集群时带上序号
    pub name: String,
    pub agent_type: Specialization,
    /// 独占沙箱，随集群拆除一起销毁
    pub sandbox: Sandbox,
    pub cluster_id: String,
    pub status: AgentStatus,
    pub resource_usage: ResourceUsage,
    pub completed: Vec<TaskResult>,
}

impl Agent {
    pub fn new(agent_type: Specialization, sandbox: Sandbox, cluster_id: impl Into<String>) -> Self {
        Self {
            id: format!("agent_{}", uuid::Uuid::new_v4()),
            name: agent_type.display().label.to_string(),
            agent_type,
            sandbox,
            cluster_id: cluster_id.into(),
            status: AgentStatus::Idle,
            resource_usage: ResourceUsage::default(),
            completed: Vec::new(),
        }
    }

    /// 空闲或已完成上一任务的 Agent 可再次分配
    pub fn is_available(&self) -> bool {
        matches!(
            self.status,
            AgentStatus::Idle | AgentStatus::Completed | AgentStatus::Failed
        )
    }

    pub fn assign(&mut self) {
        self.status = AgentStatus::Assigned;
    }

    /// 在沙箱超时内执行任务；超时记为 RunnerError::Timeout
    pub async fn execute(
        &mut self,
        runner: &dyn TaskRunner,
        task: &MicroTask,
    ) -> Result<TaskOutput, RunnerError> {
        self.status = AgentStatus::Working;
        let timeout_secs = self.sandbox.policy.limits().timeout_secs;
        let start = Instant::now();
        let result = match timeout(Duration::from_secs(timeout_secs), runner.run(&self.sandbox, task)).await {
            Ok(inner) => inner,
            Err(_) => Err(RunnerError::Timeout(timeout_secs)),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(RunnerError::Timeout(_)) => "timeout",
            Err(RunnerError::Fatal(_)) => "fatal",
            Err(RunnerError::Failed(_)) => "error",
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "task_audit",
            "agent": self.id,
            "agent_name": self.name,
            "agent_type": self.agent_type.as_str(),
            "sandbox": self.sandbox.id,
            "task": task.id,
            "operation": task.operation.as_str(),
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": duration_ms,
        });
        tracing::info!(audit = %audit.to_string(), "task");

        self.resource_usage.tasks_executed += 1;
        self.resource_usage.busy_ms += duration_ms;
        if let Ok(output) = &result {
            self.resource_usage.memory_mb = output.memory_mb;
        }
        self.status = if result.is_ok() {
            AgentStatus::Completed
        } else {
            AgentStatus::Failed
        };
        result
    }

    /// 记录经安全闸门处理后的任务结果
    pub fn record(&mut self, result: TaskResult) {
        self.completed.push(result);
    }
}
