//! 全局记忆：任务结果、失败记录与建议性条目的只追加日志
//!
//! 容量有界（超出时同步淘汰最旧条目），所有并发写入经同一把写锁串行化，读取可并发。
//! 支持按类型查询与自由文本检索（内容与元数据值，大小写不敏感）。

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

/// 条目类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryEntryType {
    TaskResult,
    Failure,
    Insight,
    Warning,
    Decision,
}

impl fmt::Display for MemoryEntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryEntryType::TaskResult => "task_result",
            MemoryEntryType::Failure => "failure",
            MemoryEntryType::Insight => "insight",
            MemoryEntryType::Warning => "warning",
            MemoryEntryType::Decision => "decision",
        };
        f.write_str(s)
    }
}

/// 单条记忆
#[derive(Clone, Debug, Serialize)]
pub struct MemoryEntry {
    pub entry_type: MemoryEntryType,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(entry_type: MemoryEntryType, content: impl Into<String>) -> Self {
        Self {
            entry_type,
            content: content.into(),
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    fn matches(&self, needle_lower: &str) -> bool {
        self.content.to_lowercase().contains(needle_lower)
            || self
                .metadata
                .values()
                .any(|v| v.to_lowercase().contains(needle_lower))
    }
}

/// 全局记忆：容量有界的环形日志，多写者安全
#[derive(Debug)]
pub struct GlobalMemory {
    entries: RwLock<VecDeque<MemoryEntry>>,
    capacity: usize,
}

impl GlobalMemory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 追加条目；超出容量时淘汰最旧条目
    pub async fn append(&self, entry: MemoryEntry) {
        let mut entries = self.entries.write().await;
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub async fn record(&self, entry_type: MemoryEntryType, content: impl Into<String>) {
        self.append(MemoryEntry::new(entry_type, content)).await;
    }

    pub async fn by_type(&self, entry_type: MemoryEntryType) -> Vec<MemoryEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.entry_type == entry_type)
            .cloned()
            .collect()
    }

    pub async fn search(&self, query: &str) -> Vec<MemoryEntry> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.matches(&needle))
            .cloned()
            .collect()
    }

    /// 失败任务 id 列表（来自 failure 条目的 task_id 元数据）
    pub async fn failed_task_ids(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.entry_type == MemoryEntryType::Failure)
            .filter_map(|e| e.metadata.get("task_id").cloned())
            .collect()
    }

    /// 最近 n 条（按时间正序）
    pub async fn recent(&self, n: usize) -> Vec<MemoryEntry> {
        let entries = self.entries.read().await;
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for GlobalMemory {
    fn default() -> Self {
        Self::new(1000)
    }
}
