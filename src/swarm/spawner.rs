//! 集群生成：按需求逐个创建沙箱并绑定 Idle Agent
//!
//! 任一沙箱创建失败时销毁已创建的全部沙箱，再返回 ClusterSpawnFailed。

use std::sync::Arc;

use futures_util::future::join_all;

use crate::core::OrchestrationError;
use crate::plan::MasterPlan;
use crate::sandbox::{ResourceLimits, SandboxError, SandboxId, SandboxManager, SandboxPolicy};
use crate::swarm::agent::Agent;
use crate::swarm::cluster::SwarmCluster;
use crate::swarm::configurator::SwarmConfiguration;

pub struct ClusterSpawner {
    manager: Arc<dyn SandboxManager>,
    limits: ResourceLimits,
    test_commands: Vec<String>,
}

impl ClusterSpawner {
    pub fn new(manager: Arc<dyn SandboxManager>) -> Self {
        Self {
            manager,
            limits: ResourceLimits::default(),
            test_commands: Vec::new(),
        }
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// test 专长沙箱的命令白名单
    pub fn with_test_commands(mut self, commands: Vec<String>) -> Self {
        self.test_commands = commands;
        self
    }

    pub async fn spawn(
        &self,
        config: SwarmConfiguration,
        plan: MasterPlan,
    ) -> Result<SwarmCluster, OrchestrationError> {
        let cluster_id = format!("swarm_{}", uuid::Uuid::new_v4());
        let requirements = config.requirements.clone();
        let mut cluster = SwarmCluster::new(cluster_id, plan, config);

        for req in &requirements {
            for _ in 0..req.count {
                let policy = SandboxPolicy::for_specialization(req.agent_type, self.limits, &self.test_commands);
                match self.manager.create(policy).await {
                    Ok(sandbox) => {
                        cluster.add_agent(Agent::new(req.agent_type, sandbox, cluster.id.clone()));
                    }
                    Err(e) => {
                        let leaked = self.rollback(&cluster).await;
                        tracing::warn!(
                            cluster_id = %cluster.id,
                            agent_type = %req.agent_type,
                            created = cluster.sandbox_ids.len(),
                            rollback_failed = leaked.len(),
                            error = %e,
                            "Sandbox creation failed, spawn rolled back"
                        );
                        return Err(OrchestrationError::ClusterSpawnFailed(format!(
                            "{} sandbox for phase {}: {}",
                            req.agent_type, req.phase_id, e
                        )));
                    }
                }
            }
        }

        tracing::info!(cluster_id = %cluster.id, agents = cluster.agents.len(), "Cluster spawned");
        Ok(cluster)
    }

    /// 并发销毁已创建的沙箱；返回销毁失败的沙箱及错误
    async fn rollback(&self, cluster: &SwarmCluster) -> Vec<(SandboxId, SandboxError)> {
        let manager = self.manager.as_ref();
        let outcomes = join_all(cluster.sandbox_ids.iter().map(|id| async move {
            (id.clone(), manager.destroy(id).await)
        }))
        .await;

        let failures: Vec<(SandboxId, SandboxError)> = outcomes
            .into_iter()
            .filter_map(|(id, r)| r.err().map(|e| (id, e)))
            .collect();
        for (id, e) in &failures {
            tracing::warn!(cluster_id = %cluster.id, sandbox_id = %id, error = %e, "Sandbox rollback failed");
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::plan::{Complexity, MicroTask, Phase};
    use crate::sandbox::{InMemorySandboxManager, Operation, Sandbox};
    use crate::swarm::{AgentStatus, Specialization, SwarmConfigurator};

    /// 第一个沙箱的销毁总是失败
    struct StickyManager {
        inner: InMemorySandboxManager,
        first: Mutex<Option<SandboxId>>,
        destroy_calls: Mutex<Vec<SandboxId>>,
    }

    #[async_trait]
    impl SandboxManager for StickyManager {
        async fn create(&self, policy: SandboxPolicy) -> Result<Sandbox, SandboxError> {
            let sandbox = self.inner.create(policy).await?;
            self.first.lock().unwrap().get_or_insert_with(|| sandbox.id.clone());
            Ok(sandbox)
        }

        async fn destroy(&self, id: &SandboxId) -> Result<(), SandboxError> {
            self.destroy_calls.lock().unwrap().push(id.clone());
            if self.first.lock().unwrap().as_ref() == Some(id) {
                return Err(SandboxError::Backend("device busy".into()));
            }
            self.inner.destroy(id).await
        }

        async fn is_live(&self, id: &SandboxId) -> bool {
            self.inner.is_live(id).await
        }

        async fn live_count(&self) -> usize {
            self.inner.live_count().await
        }
    }

    fn plan(complexity: Complexity) -> MasterPlan {
        MasterPlan::new(
            "g",
            vec![Phase {
                id: "p1".into(),
                name: "P".into(),
                tasks: vec![MicroTask::new("t1", "t", Specialization::Code)],
                complexity,
                primary_type: Specialization::Code,
            }],
        )
    }

    #[tokio::test]
    async fn test_spawn_binds_one_sandbox_per_agent() {
        let manager = Arc::new(InMemorySandboxManager::default());
        let spawner = ClusterSpawner::new(manager.clone()).with_test_commands(vec!["cargo test".into()]);
        let plan = plan(Complexity::Medium);
        let config = SwarmConfigurator::default().configure(&plan);
        let cluster = spawner.spawn(config, plan).await.unwrap();

        assert!(cluster.id.starts_with("swarm_"));
        assert_eq!(cluster.agents.len(), 2);
        assert_eq!(manager.live_count().await, 2);
        assert!(cluster.agents.iter().all(|a| a.status == AgentStatus::Idle && a.cluster_id == cluster.id));
        let tester = cluster.agents_of(Specialization::Test).next().unwrap();
        assert!(tester.sandbox.policy.permits(Operation::Execute));
        assert!(tester.sandbox.policy.permits_command("cargo test"));
        assert_eq!(tester.name, "Tester 1");
    }

    #[tokio::test]
    async fn test_agents_are_named_per_specialization() {
        let manager = Arc::new(InMemorySandboxManager::default());
        let spawner = ClusterSpawner::new(manager.clone());
        let plan = plan(Complexity::High);
        let config = SwarmConfigurator::default().configure(&plan);
        let cluster = spawner.spawn(config, plan).await.unwrap();

        let names: Vec<&str> = cluster.agents.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["Architect 1", "Coder 1", "Coder 2", "Analyst 1"]);
    }

    #[tokio::test]
    async fn test_spawn_failure_rolls_back() {
        let manager = Arc::new(InMemorySandboxManager::default().with_max_live(Some(2)));
        let spawner = ClusterSpawner::new(manager.clone());
        let plan = plan(Complexity::High);
        let config = SwarmConfigurator::default().configure(&plan);
        let err = spawner.spawn(config, plan).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ClusterSpawnFailed(_)));
        assert_eq!(manager.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_rollback_reports_destroy_failures() {
        let manager = Arc::new(StickyManager {
            inner: InMemorySandboxManager::default().with_max_live(Some(2)),
            first: Mutex::new(None),
            destroy_calls: Mutex::new(Vec::new()),
        });
        let spawner = ClusterSpawner::new(manager.clone());
        let plan = plan(Complexity::High);
        let config = SwarmConfigurator::default().configure(&plan);
        let mut cluster = SwarmCluster::new("swarm_r".into(), plan, config);
        for _ in 0..2 {
            let policy = SandboxPolicy::for_specialization(Specialization::Code, ResourceLimits::default(), &[]);
            let sandbox = manager.create(policy).await.unwrap();
            cluster.add_agent(Agent::new(Specialization::Code, sandbox, "swarm_r"));
        }

        let failures = spawner.rollback(&cluster).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(Some(&failures[0].0), manager.first.lock().unwrap().as_ref());
        assert_eq!(failures[0].1, SandboxError::Backend("device busy".into()));
        assert_eq!(manager.destroy_calls.lock().unwrap().len(), 2);
        assert_eq!(manager.live_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_spawn_attempts_every_rollback() {
        let manager = Arc::new(StickyManager {
            inner: InMemorySandboxManager::default().with_max_live(Some(2)),
            first: Mutex::new(None),
            destroy_calls: Mutex::new(Vec::new()),
        });
        let spawner = ClusterSpawner::new(manager.clone());
        let plan = plan(Complexity::High);
        let config = SwarmConfigurator::default().configure(&plan);

        let err = spawner.spawn(config, plan).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ClusterSpawnFailed(_)));
        assert_eq!(manager.destroy_calls.lock().unwrap().len(), 2);
        assert_eq!(manager.live_count().await, 1);
    }

    #[tokio::test]
    async fn test_teardown_destroys_every_sandbox() {
        let manager = Arc::new(InMemorySandboxManager::default());
        let spawner = ClusterSpawner::new(manager.clone());
        let plan = plan(Complexity::High);
        let config = SwarmConfigurator::default().configure(&plan);
        let mut cluster = spawner.spawn(config, plan).await.unwrap();
        assert_eq!(manager.live_count().await, 4);

        // Agent 丢失不影响拆除
        cluster.agents.pop();
        let failures = cluster.teardown(manager.as_ref()).await;
        assert!(failures.is_empty());
        assert_eq!(manager.live_count().await, 0);
        assert!(cluster.agents.iter().all(|a| a.status == AgentStatus::Terminated));
    }
}
