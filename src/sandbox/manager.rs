//! 沙箱管理器：按策略创建 / 销毁沙箱实例，持有沙箱生命周期
//!
//! 沙箱是策略对象而非内核级隔离；InMemorySandboxManager 只登记存活实例并分配工作目录。
//! destroy 幂等：重复销毁或销毁未知 id 都返回 Ok。

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::sandbox::SandboxPolicy;

pub type SandboxId = String;

/// 沙箱实例：由管理器签发，整个生命周期只属于一个 Agent
#[derive(Clone, Debug)]
pub struct Sandbox {
    pub id: SandboxId,
    pub policy: SandboxPolicy,
    pub working_dir: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("Sandbox capacity exhausted ({0} live)")]
    CapacityExhausted(usize),

    #[error("Sandbox backend error: {0}")]
    Backend(String),
}

/// 沙箱管理器 trait：create / destroy，以及供校验用的存活查询
#[async_trait]
pub trait SandboxManager: Send + Sync {
    async fn create(&self, policy: SandboxPolicy) -> Result<Sandbox, SandboxError>;

    /// 幂等销毁
    async fn destroy(&self, id: &SandboxId) -> Result<(), SandboxError>;

    async fn is_live(&self, id: &SandboxId) -> bool;

    async fn live_count(&self) -> usize;
}

/// 进程内沙箱管理器：登记存活沙箱，可选存活数量上限
pub struct InMemorySandboxManager {
    live: RwLock<HashMap<SandboxId, Sandbox>>,
    root: PathBuf,
    max_live: Option<usize>,
}

impl InMemorySandboxManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            live: RwLock::new(HashMap::new()),
            root: root.into(),
            max_live: None,
        }
    }

    pub fn with_max_live(mut self, max_live: Option<usize>) -> Self {
        self.max_live = max_live;
        self
    }
}

impl Default for InMemorySandboxManager {
    fn default() -> Self {
        Self::new("workspace")
    }
}

#[async_trait]
impl SandboxManager for InMemorySandboxManager {
    async fn create(&self, policy: SandboxPolicy) -> Result<Sandbox, SandboxError> {
        let mut live = self.live.write().await;
        if let Some(max) = self.max_live {
            if live.len() >= max {
                return Err(SandboxError::CapacityExhausted(live.len()));
            }
        }

        let id = format!("sbx_{}", uuid::Uuid::new_v4());
        let working_dir = self.root.join(&id);
        let sandbox = Sandbox {
            policy: policy.with_working_dir(working_dir.clone()),
            working_dir,
            created_at: Utc::now(),
            id: id.clone(),
        };
        live.insert(id.clone(), sandbox.clone());
        tracing::debug!(sandbox_id = %id, live = live.len(), "sandbox created");
        Ok(sandbox)
    }

    async fn destroy(&self, id: &SandboxId) -> Result<(), SandboxError> {
        if self.live.write().await.remove(id).is_some() {
            tracing::debug!(sandbox_id = %id, "sandbox destroyed");
        }
        Ok(())
    }

    async fn is_live(&self, id: &SandboxId) -> bool {
        self.live.read().await.contains_key(id)
    }

    async fn live_count(&self) -> usize {
        self.live.read().await.len()
    }
}
