//! SwarmCluster：一次运行的 Agent 集合、计划副本与配置
//!
//! sandbox_ids 记录签发给本集群的全部沙箱，拆除时以它为准（即便某个 Agent 在执行中丢失）。

use chrono::{DateTime, Utc};
use futures_util::future::join_all;

use crate::plan::MasterPlan;
use crate::sandbox::{SandboxError, SandboxId, SandboxManager};
use crate::swarm::agent::{Agent, AgentStatus};
use crate::swarm::configurator::SwarmConfiguration;
use crate::swarm::Specialization;

pub type ClusterId = String;

#[derive(Debug)]
pub struct SwarmCluster {
    pub id: ClusterId,
    pub agents: Vec<Agent>,
    pub plan: MasterPlan,
    pub config: SwarmConfiguration,
    pub created_at: DateTime<Utc>,
    pub sandbox_ids: Vec<SandboxId>,
}

impl SwarmCluster {
    pub fn new(id: ClusterId, plan: MasterPlan, config: SwarmConfiguration) -> Self {
        Self {
            id,
            agents: Vec::new(),
            plan,
            config,
            created_at: Utc::now(),
            sandbox_ids: Vec::new(),
        }
    }

    /// 加入 Agent，并按同专长序号命名（"Coder 1"、"Coder 2"…）
    pub fn add_agent(&mut self, mut agent: Agent) {
        let meta = agent.agent_type.display();
        let ordinal = self.agents_of(agent.agent_type).count() + 1;
        agent.name = format!("{} {}", meta.label, ordinal);
        tracing::debug!(
            cluster_id = %self.id,
            agent_id = %agent.id,
            agent = %agent.name,
            icon = meta.icon,
            sandbox_id = %agent.sandbox.id,
            "Agent joined cluster"
        );
        self.sandbox_ids.push(agent.sandbox.id.clone());
        self.agents.push(agent);
    }

    pub fn agents_of(&self, spec: Specialization) -> impl Iterator<Item = &Agent> {
        self.agents.iter().filter(move |a| a.agent_type == spec)
    }

    /// 并发销毁全部沙箱；返回销毁失败的沙箱及错误
    pub async fn teardown(&mut self, manager: &dyn SandboxManager) -> Vec<(SandboxId, SandboxError)> {
        let outcomes = join_all(self.sandbox_ids.iter().map(|id| async move {
            (id.clone(), manager.destroy(id).await)
        }))
        .await;

        for agent in &mut self.agents {
            agent.status = AgentStatus::Terminated;
        }

        let failures: Vec<(SandboxId, SandboxError)> = outcomes
            .into_iter()
            .filter_map(|(id, r)| r.err().map(|e| (id, e)))
            .collect();
        for (id, e) in &failures {
            tracing::warn!(cluster_id = %self.id, sandbox_id = %id, error = %e, "Sandbox teardown failed");
        }
        tracing::info!(
            cluster_id = %self.id,
            sandboxes = self.sandbox_ids.len(),
            failed = failures.len(),
            "Cluster torn down"
        );
        failures
    }
}
