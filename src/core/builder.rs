//! Queen 构建器：统一的组件初始化
//!
//! 未显式注入的组件按配置创建：LLM 由 provider / API Key 决定（外加超时重试包装），
//! 沙箱管理器用进程内实现，任务执行器用 LlmTaskRunner，全局记忆按 memory_capacity 建立。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::consolidator::Consolidator;
use crate::core::orchestrator::{create_llm_from_config, Queen};
use crate::core::SessionSupervisor;
use crate::llm::LlmClient;
use crate::memory::GlobalMemory;
use crate::plan::Planner;
use crate::safety::SafetyGate;
use crate::sandbox::{InMemorySandboxManager, SandboxManager};
use crate::scheduler::ExecutionScheduler;
use crate::swarm::{ClusterSpawner, SwarmConfigurator};
use crate::worker::{LlmTaskRunner, TaskRunner};

pub struct QueenBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    runner: Option<Arc<dyn TaskRunner>>,
    sandbox_manager: Option<Arc<dyn SandboxManager>>,
    memory: Option<Arc<GlobalMemory>>,
}

impl QueenBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            runner: None,
            sandbox_manager: None,
            memory: None,
        }
    }

    /// 规划与汇总使用的 LLM（按原样使用，不再包装重试）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn TaskRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_sandbox_manager(mut self, manager: Arc<dyn SandboxManager>) -> Self {
        self.sandbox_manager = Some(manager);
        self
    }

    pub fn with_memory(mut self, memory: Arc<GlobalMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn build(self) -> Queen {
        let cfg = self.config;
        let llm = self.llm.unwrap_or_else(|| create_llm_from_config(&cfg));
        let memory = self
            .memory
            .unwrap_or_else(|| Arc::new(GlobalMemory::new(cfg.swarm.memory_capacity)));
        let sandbox_manager = self.sandbox_manager.unwrap_or_else(|| {
            Arc::new(
                InMemorySandboxManager::new(cfg.app.workspace_root()).with_max_live(cfg.sandbox.max_live),
            )
        });
        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(LlmTaskRunner::new(llm.clone())));

        let gate = Arc::new(
            SafetyGate::new(memory.clone()).with_extra_patterns(&cfg.safety.extra_dangerous_patterns),
        );

        Queen {
            planner: Planner::new(llm.clone()).with_memory(memory.clone()),
            configurator: SwarmConfigurator::from_config(&cfg.swarm),
            spawner: ClusterSpawner::new(sandbox_manager.clone())
                .with_limits(cfg.sandbox.limits())
                .with_test_commands(cfg.sandbox.test_commands.clone()),
            scheduler: ExecutionScheduler::new(runner, gate, memory.clone()),
            consolidator: Consolidator::new(llm, sandbox_manager.clone()),
            memory,
            sandbox_manager,
            supervisor: SessionSupervisor::new(),
            active: Default::default(),
        }
    }
}
