//! 记忆层：所有并发任务共享的全局记忆

pub mod global;

pub use global::{GlobalMemory, MemoryEntry, MemoryEntryType};
