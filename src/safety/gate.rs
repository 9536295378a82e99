//! 安全闸门：任务执行前后的强制检查
//!
//! - screen：标题 / 描述 / 交付物 / 命令命中危险模式 → DangerousOperation
//! - pre_check：危险模式 → 操作是否被沙箱策略允许（execute 还需命中命令白名单）→ 内存上限
//! - post_check：结果脱敏；失败结果写入 failure 记忆条目

use std::sync::Arc;

use crate::core::OrchestrationError;
use crate::memory::{GlobalMemory, MemoryEntry, MemoryEntryType};
use crate::plan::{MicroTask, TaskResult};
use crate::safety::patterns::{DangerousPatterns, Redactor};
use crate::sandbox::Operation;
use crate::swarm::Agent;

pub struct SafetyGate {
    patterns: DangerousPatterns,
    redactor: Redactor,
    memory: Arc<GlobalMemory>,
}

impl SafetyGate {
    pub fn new(memory: Arc<GlobalMemory>) -> Self {
        Self {
            patterns: DangerousPatterns::builtin(),
            redactor: Redactor::new(),
            memory,
        }
    }

    /// 追加配置中的危险模式（[safety].extra_dangerous_patterns）
    pub fn with_extra_patterns(mut self, extra: &[String]) -> Self {
        self.patterns = self.patterns.with_extra(extra);
        self
    }

    /// 危险模式筛查，分配 Agent 之前对每个任务执行
    pub fn screen(&self, task: &MicroTask) -> Result<(), OrchestrationError> {
        let fields = [
            Some(task.title.as_str()),
            Some(task.description.as_str()),
            task.deliverable.as_deref(),
            task.command.as_deref(),
        ];
        for text in fields.into_iter().flatten() {
            if let Some(label) = self.patterns.find(text) {
                tracing::warn!(task_id = %task.id, pattern = %label, "Dangerous operation rejected");
                return Err(OrchestrationError::DangerousOperation(format!(
                    "task {} matches {}",
                    task.id, label
                )));
            }
        }
        Ok(())
    }

    pub fn pre_check(&self, agent: &Agent, task: &MicroTask) -> Result<(), OrchestrationError> {
        self.screen(task)?;

        let policy = &agent.sandbox.policy;
        if !policy.permits(task.operation) {
            return Err(OrchestrationError::OperationNotAllowed(format!(
                "{} is not permitted for {} agent {} (task {})",
                task.operation, agent.agent_type, agent.id, task.id
            )));
        }
        if task.operation == Operation::Execute {
            if let Some(command) = &task.command {
                if !policy.permits_command(command) {
                    return Err(OrchestrationError::OperationNotAllowed(format!(
                        "command `{}` is not on the allowlist of agent {}",
                        command, agent.id
                    )));
                }
            }
        }

        let max_memory_mb = policy.limits().max_memory_mb;
        if agent.resource_usage.memory_mb > max_memory_mb {
            return Err(OrchestrationError::ResourceLimitExceeded(format!(
                "agent {} uses {}MB, limit {}MB",
                agent.id, agent.resource_usage.memory_mb, max_memory_mb
            )));
        }
        Ok(())
    }

    /// 结果脱敏；失败结果追加 failure 条目
    pub async fn post_check(&self, mut result: TaskResult, task: &MicroTask) -> TaskResult {
        result.content = self.redactor.redact(&result.content);
        if !result.is_success() {
            self.memory
                .append(
                    MemoryEntry::new(MemoryEntryType::Failure, result.content.clone())
                        .with_meta("task_id", result.task_id.clone())
                        .with_meta("agent_id", result.agent_id.clone())
                        .with_meta("timestamp", result.timestamp.to_rfc3339())
                        .with_meta("task_type", task.task_type.as_str()),
                )
                .await;
        }
        result
    }
}
