//! 任务执行器抽象
//!
//! TaskRunner 在给定沙箱内执行单个 MicroTask；LlmTaskRunner 以专长对应的 system prompt 请 LLM 完成任务。
//! 错误分为可恢复（Failed / Timeout，只影响当前任务）与不可恢复（Fatal，终止后续依赖组）。

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::{LlmClient, Message};
use crate::plan::MicroTask;
use crate::sandbox::Sandbox;

/// 执行输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutput {
    pub content: String,
    /// 执行期间的内存占用（MB），计入 Agent 资源使用
    pub memory_mb: u64,
}

impl TaskOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            memory_mb: 0,
        }
    }

    pub fn with_memory_mb(mut self, memory_mb: u64) -> Self {
        self.memory_mb = memory_mb;
        self
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("Task failed: {0}")]
    Failed(String),

    #[error("Task timed out after {0}s")]
    Timeout(u64),

    /// 执行基础设施不可用，后续依赖组不再执行
    #[error("Fatal runner error: {0}")]
    Fatal(String),
}

impl RunnerError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RunnerError::Fatal(_))
    }
}

#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, sandbox: &Sandbox, task: &MicroTask) -> Result<TaskOutput, RunnerError>;
}

/// 由 LLM 完成任务的执行器
pub struct LlmTaskRunner {
    llm: Arc<dyn LlmClient>,
}

impl LlmTaskRunner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn system_prompt(sandbox: &Sandbox, task: &MicroTask) -> String {
        let allowed: Vec<&str> = sandbox.policy.allowed().iter().map(|op| op.as_str()).collect();
        let mut prompt = format!(
            "{}\nSandbox: {} (working dir {}). Permitted operations: {}. Network access: {}.",
            task.task_type.worker_prompt(),
            sandbox.id,
            sandbox.working_dir.display(),
            allowed.join(", "),
            if sandbox.policy.network() { "yes" } else { "no" },
        );
        if let Some(commands) = sandbox.policy.allowed_commands() {
            prompt.push_str(&format!(" Allowed commands: {}.", commands.join(", ")));
        }
        prompt
    }

    fn task_prompt(task: &MicroTask) -> String {
        let mut prompt = format!("## Task {}\n{}\n\n{}\n", task.id, task.title, task.description);
        if let Some(deliverable) = &task.deliverable {
            prompt.push_str(&format!("\nDeliverable: {deliverable}\n"));
        }
        if let Some(command) = &task.command {
            prompt.push_str(&format!("\nCommand: {command}\n"));
        }
        if !task.dependencies.is_empty() {
            prompt.push_str(&format!("\nBuilds on: {}\n", task.dependencies.join(", ")));
        }
        prompt
    }
}

#[async_trait]
impl TaskRunner for LlmTaskRunner {
    async fn run(&self, sandbox: &Sandbox, task: &MicroTask) -> Result<TaskOutput, RunnerError> {
        let messages = vec![
            Message::system(Self::system_prompt(sandbox, task)),
            Message::user(Self::task_prompt(task)),
        ];
        let content = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| RunnerError::Failed(e.to_string()))?;
        Ok(TaskOutput::new(content))
    }
}
