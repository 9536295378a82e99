//! Mock LLM 客户端（无需 API）
//!
//! MockLlmClient：识别规划提示词时返回单阶段 JSON 计划，其余请求回显为简短文本，便于本地跑通编排流程。
//! ScriptedLlmClient：按顺序返回预设回复，供测试精确控制外部协作方的行为。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message, Role};

/// 规划提示词中的目标标记，Mock 据此判断是否为规划请求
pub(crate) const GOAL_MARKER: &str = "## Goal";

/// Mock 客户端
#[derive(Debug, Default)]
pub struct MockLlmClient;

fn last_user(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| matches!(m.role, Role::User))
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)")
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let input = last_user(messages);

        if let Some(idx) = input.find(GOAL_MARKER) {
            let goal = input[idx + GOAL_MARKER.len()..]
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("goal");
            let plan = serde_json::json!({
                "phases": [{
                    "id": "phase-1",
                    "name": "Implementation",
                    "complexity": "low",
                    "primary_type": "code",
                    "tasks": [{
                        "id": "task-1",
                        "title": goal,
                        "description": goal,
                        "type": "code",
                        "effort": 2,
                        "estimated_duration": "30m",
                        "dependencies": []
                    }]
                }],
                "estimated_duration": "30m",
                "success_criteria": ["Goal implemented"]
            });
            return Ok(plan.to_string());
        }

        let preview: String = input.chars().take(120).collect();
        Ok(format!("Mock response: {}", preview))
    }
}

/// 按顺序返回预设结果的客户端；队列耗尽后返回 EmptyResponse
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 已收到的请求次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 每次请求最后一条 user 消息
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(last_user(messages).to_string());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .unwrap_or(Err(LlmError::EmptyResponse))
    }
}
