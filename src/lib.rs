//! Hive - Rust 多智能体任务编排引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: Queen 主控、状态机、错误、运行监管、结果汇总
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 并发任务共享的全局记忆
//! - **plan**: MasterPlan 数据模型与 Planner
//! - **safety**: 危险模式筛查、策略检查与结果脱敏
//! - **sandbox**: 沙箱策略与生命周期管理
//! - **scheduler**: 依赖分组与按组并发执行
//! - **swarm**: Agent 专长、集群配置与生成
//! - **worker**: 沙箱内的单任务执行

pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod plan;
pub mod safety;
pub mod sandbox;
pub mod scheduler;
pub mod swarm;
pub mod worker;

pub use crate::core::{OrchestrationError, OrchestrationResult, Queen, QueenBuilder, QueenState};
