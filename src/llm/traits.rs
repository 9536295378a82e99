//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient::complete；编排核心只需要最终文本，不需要流式。
//! RetryingLlmClient 为外部协作方提供超时与指数退避重试，Planner / Consolidator 本身不重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Empty response")]
    EmptyResponse,
}

impl LlmError {
    /// 网络抖动、限流、超时属于可重试错误
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Request(_) | LlmError::RateLimited { .. } | LlmError::Timeout(_)
        )
    }
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// send(prompt, context?)：context 作为 system 消息前置
    async fn send(&self, prompt: &str, context: Option<&str>) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(ctx) = context {
            messages.push(Message::system(ctx));
        }
        messages.push(Message::user(prompt));
        self.complete(&messages).await
    }

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            request_timeout_secs: 60,
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试前的等待时间（指数退避；限流时取服务端建议值与退避值的较大者）
    fn delay_for(&self, attempt: u32, err: &LlmError) -> Duration {
        let backoff = self.base_delay_ms.saturating_mul(1u64 << attempt.min(16));
        let ms = match err {
            LlmError::RateLimited { retry_after_ms } => backoff.max(*retry_after_ms),
            _ => backoff,
        };
        Duration::from_millis(ms)
    }
}

/// 包装任意 LlmClient：每次请求加超时，可重试错误按指数退避重试
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        let mut attempt = 0;
        loop {
            let result = match tokio::time::timeout(timeout, self.inner.complete(messages)).await {
                Ok(r) => r,
                Err(_) => Err(LlmError::Timeout(self.config.request_timeout_secs)),
            };
            match result {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.config.delay_for(attempt, &e);
                    tracing::warn!(attempt, error = %e, delay_ms = delay.as_millis() as u64, "LLM request failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}
