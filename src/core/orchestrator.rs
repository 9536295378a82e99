//! Queen：编排主控
//!
//! goal → Planner → SwarmConfigurator → ClusterSpawner → ExecutionScheduler → Consolidator。
//! 状态 idle → analyzing → orchestrating → consolidating → completed，任一非 idle 状态可转入 failed。
//! 规划与集群生成失败终止本次运行；执行失败与总结失败不终止，照常汇总。
//! 并发调用互不影响，各自的集群登记在 active_swarms 中，运行结束后移除。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::builder::QueenBuilder;
use crate::core::consolidator::{Consolidator, OrchestrationResult};
use crate::core::{OrchestrationError, QueenState, SessionSupervisor};
use crate::llm::{create_deepseek_client, LlmClient, OpenAiClient, RetryingLlmClient};
use crate::memory::{GlobalMemory, MemoryEntry, MemoryEntryType};
use crate::plan::Planner;
use crate::sandbox::SandboxManager;
use crate::scheduler::ExecutionScheduler;
use crate::swarm::{ClusterId, ClusterSpawner, SwarmConfigurator};

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）；真实后端外加超时重试
pub(crate) fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    // 有 DeepSeek Key 或（配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点）
    let use_deepseek = provider != "mock"
        && (std::env::var("DEEPSEEK_API_KEY").is_ok()
            || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok()));
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider == "openai";

    let inner: Arc<dyn LlmClient> = if use_deepseek {
        let model = cfg
            .llm
            .deepseek
            .model
            .clone()
            .unwrap_or_else(|| cfg.llm.model.clone());
        tracing::info!("Using DeepSeek LLM ({})", model);
        Arc::new(create_deepseek_client(Some(&model)))
    } else if use_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let base = cfg.llm.base_url.as_deref();
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(OpenAiClient::new(
            base,
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider is mock, using Mock LLM");
        return Arc::new(crate::llm::MockLlmClient);
    };
    Arc::new(RetryingLlmClient::new(inner, cfg.llm.retry_config()))
}

/// active_swarms 中登记的运行快照
#[derive(Debug, Clone, Serialize)]
pub struct SwarmRun {
    pub goal: String,
    pub state: QueenState,
    pub agents: usize,
    pub started_at: DateTime<Utc>,
}

pub struct Queen {
    pub(crate) planner: Planner,
    pub(crate) configurator: SwarmConfigurator,
    pub(crate) spawner: ClusterSpawner,
    pub(crate) scheduler: ExecutionScheduler,
    pub(crate) consolidator: Consolidator,
    pub(crate) memory: Arc<GlobalMemory>,
    pub(crate) sandbox_manager: Arc<dyn SandboxManager>,
    pub(crate) supervisor: SessionSupervisor,
    pub(crate) active: RwLock<HashMap<ClusterId, SwarmRun>>,
}

/// 单次运行的状态推进（非法转换返回 InvalidTransition）
struct RunState {
    state: QueenState,
}

impl RunState {
    fn advance(&mut self, next: QueenState) -> Result<QueenState, OrchestrationError> {
        self.state = self.state.transition(next)?;
        tracing::debug!(state = ?self.state, "Queen state");
        Ok(self.state)
    }

    fn fail(&mut self, error: &OrchestrationError) {
        if let Ok(s) = self.state.transition(QueenState::Failed) {
            self.state = s;
        }
        if error.aborts_run() {
            tracing::error!(error = %error, "Orchestration failed");
        } else {
            tracing::warn!(error = %error, "Orchestration stopped");
        }
    }
}

impl Queen {
    /// 默认配置 + 指定 LLM
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        QueenBuilder::new(AppConfig::default()).with_llm(llm).build()
    }

    pub fn builder(config: AppConfig) -> QueenBuilder {
        QueenBuilder::new(config)
    }

    pub fn memory(&self) -> Arc<GlobalMemory> {
        self.memory.clone()
    }

    pub fn sandbox_manager(&self) -> Arc<dyn SandboxManager> {
        self.sandbox_manager.clone()
    }

    /// 当前在途运行（集群 id → 快照）
    pub async fn active_swarms(&self) -> HashMap<ClusterId, SwarmRun> {
        self.active.read().await.clone()
    }

    /// 取消全部在途运行
    pub fn cancel_all(&self) {
        self.supervisor.cancel();
    }

    pub fn supervisor(&self) -> &SessionSupervisor {
        &self.supervisor
    }

    pub async fn orchestrate(&self, goal: &str) -> Result<OrchestrationResult, OrchestrationError> {
        self.orchestrate_with_cancel(goal, self.supervisor.child_token()).await
    }

    pub async fn orchestrate_with_cancel(
        &self,
        goal: &str,
        cancel: CancellationToken,
    ) -> Result<OrchestrationResult, OrchestrationError> {
        let started = Instant::now();
        let started_at = Utc::now();
        let goal = goal.trim();
        let mut run = RunState { state: QueenState::Idle };

        run.advance(QueenState::Analyzing)?;
        tracing::info!(goal = %goal, "Orchestration started");
        let planned = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(OrchestrationError::Cancelled),
            r = self.planner.plan(goal) => r,
        };
        let plan = match planned {
            Ok(plan) => plan,
            Err(e) => {
                run.fail(&e);
                return Err(e);
            }
        };

        let config = self.configurator.configure(&plan);
        self.memory
            .append(
                MemoryEntry::new(
                    MemoryEntryType::Decision,
                    format!(
                        "Coordination mode {} with {} agents for {} tasks",
                        config.mode,
                        config.total_agents(),
                        plan.task_count()
                    ),
                )
                .with_meta("plan_id", plan.id.clone())
                .with_meta("mode", config.mode.to_string()),
            )
            .await;

        run.advance(QueenState::Orchestrating)?;
        if cancel.is_cancelled() {
            let e = OrchestrationError::Cancelled;
            run.fail(&e);
            return Err(e);
        }
        let mut cluster = match self.spawner.spawn(config, plan).await {
            Ok(cluster) => cluster,
            Err(e) => {
                run.fail(&e);
                return Err(e);
            }
        };
        self.active.write().await.insert(
            cluster.id.clone(),
            SwarmRun {
                goal: goal.to_string(),
                state: run.state,
                agents: cluster.agents.len(),
                started_at,
            },
        );

        let report = self.scheduler.run(&mut cluster, cancel).await;
        if let Some(e) = &report.error {
            tracing::warn!(cluster_id = %cluster.id, error = %e, "Execution ended with error, consolidating partial results");
        }

        let state = run.advance(QueenState::Consolidating)?;
        if let Some(entry) = self.active.write().await.get_mut(&cluster.id) {
            entry.state = state;
        }
        let result = self.consolidator.consolidate(goal, &mut cluster, &report, started).await;
        self.memory
            .append(
                MemoryEntry::new(MemoryEntryType::Insight, result.summary.clone())
                    .with_meta("cluster_id", cluster.id.clone())
                    .with_meta("goal", goal),
            )
            .await;

        run.advance(QueenState::Completed)?;
        self.active.write().await.remove(&cluster.id);
        tracing::info!(
            cluster_id = %result.cluster_id,
            completed = result.tasks_completed,
            failed = result.tasks_failed,
            blocked = result.tasks_blocked,
            duration_ms = result.duration_ms,
            "Orchestration completed"
        );
        Ok(result)
    }
}
