//! 结果汇总：收集全部 Agent 的任务结果，请 LLM 生成总结，然后拆除集群沙箱
//!
//! 沙箱拆除在返回前必然发生；总结失败时使用占位总结并标记 summary_degraded。

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::core::OrchestrationError;
use crate::llm::LlmClient;
use crate::plan::{TaskResult, TaskStatus};
use crate::sandbox::SandboxManager;
use crate::scheduler::ExecutionReport;
use crate::swarm::{CoordinationMode, SwarmCluster};

pub const SUMMARY_PLACEHOLDER: &str = "Summary unavailable: summarization failed. See task results for details.";

const CONSOLIDATOR_SYSTEM_PROMPT: &str = "You are the consolidation module of a multi-agent orchestrator. \
Summarize what the agents achieved for the goal, what failed, and what remains. Be concise.";

/// 单次编排的最终结果
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub goal: String,
    pub cluster_id: String,
    pub plan_id: String,
    pub coordination_mode: CoordinationMode,
    pub summary: String,
    pub summary_degraded: bool,
    pub duration_ms: u64,
    pub agents_used: usize,
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub tasks_blocked: usize,
    pub execution_error: Option<String>,
}

fn format_results(goal: &str, results: &[TaskResult], report: &ExecutionReport) -> String {
    let mut out = format!("## Objective\n{goal}\n\n## Task results\n");
    if results.is_empty() {
        out.push_str("(no task produced a result)\n");
    }
    for r in results {
        let status = if r.is_success() { "success" } else { "failed" };
        out.push_str(&format!("- [{}] {} ({}): {}\n", status, r.task_id, r.agent_id, r.content));
    }
    let blocked: Vec<&str> = report
        .tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Blocked)
        .map(|t| t.id.as_str())
        .collect();
    if !blocked.is_empty() {
        out.push_str(&format!("\nBlocked tasks: {}\n", blocked.join(", ")));
    }
    if let Some(e) = &report.error {
        out.push_str(&format!("\nExecution error: {e}\n"));
    }
    out
}

pub struct Consolidator {
    llm: Arc<dyn LlmClient>,
    manager: Arc<dyn SandboxManager>,
}

impl Consolidator {
    pub fn new(llm: Arc<dyn LlmClient>, manager: Arc<dyn SandboxManager>) -> Self {
        Self { llm, manager }
    }

    pub async fn consolidate(
        &self,
        goal: &str,
        cluster: &mut SwarmCluster,
        report: &ExecutionReport,
        started: Instant,
    ) -> OrchestrationResult {
        let results = &report.results;
        let prompt = format_results(goal, results, report);

        let summary = self
            .llm
            .send(&prompt, Some(CONSOLIDATOR_SYSTEM_PROMPT))
            .await
            .map_err(|e| OrchestrationError::SummarizationFailed(e.to_string()));
        let (summary, summary_degraded) = match summary {
            Ok(s) => (s, false),
            Err(e) => {
                tracing::warn!(cluster_id = %cluster.id, error = %e, "Using placeholder summary");
                (SUMMARY_PLACEHOLDER.to_string(), true)
            }
        };

        cluster.teardown(self.manager.as_ref()).await;

        OrchestrationResult {
            goal: goal.to_string(),
            cluster_id: cluster.id.clone(),
            plan_id: cluster.plan.id.clone(),
            coordination_mode: cluster.config.mode,
            summary,
            summary_degraded,
            duration_ms: started.elapsed().as_millis() as u64,
            agents_used: cluster.sandbox_ids.len(),
            tasks_completed: results.iter().filter(|r| r.is_success()).count(),
            tasks_failed: report.count(TaskStatus::Failed),
            tasks_blocked: report.count(TaskStatus::Blocked),
            execution_error: report.error.as_ref().map(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use crate::plan::{Complexity, MasterPlan, MicroTask, Phase};
    use crate::sandbox::{InMemorySandboxManager, ResourceLimits, SandboxPolicy};
    use crate::swarm::{Agent, Specialization, SwarmConfigurator};

    fn report_with_result(cluster: &SwarmCluster) -> ExecutionReport {
        let mut task = MicroTask::new("t1", "t", Specialization::Code);
        task.status = TaskStatus::Completed;
        ExecutionReport {
            tasks: vec![task],
            results: cluster.agents.iter().flat_map(|a| a.completed.iter().cloned()).collect(),
            error: None,
        }
    }

    async fn cluster_with_result(manager: &InMemorySandboxManager) -> SwarmCluster {
        let plan = MasterPlan::new(
            "goal",
            vec![Phase {
                id: "p1".into(),
                name: "P".into(),
                tasks: vec![MicroTask::new("t1", "t", Specialization::Code)],
                complexity: Complexity::Low,
                primary_type: Specialization::Code,
            }],
        );
        let config = SwarmConfigurator::default().configure(&plan);
        let mut cluster = SwarmCluster::new("swarm_c".into(), plan, config);
        let policy = SandboxPolicy::for_specialization(Specialization::Code, ResourceLimits::default(), &[]);
        let mut agent = Agent::new(Specialization::Code, manager.create(policy).await.unwrap(), "swarm_c");
        agent.record(TaskResult::success("t1", agent.id.clone(), "wrote main.rs"));
        cluster.add_agent(agent);
        cluster
    }

    #[tokio::test]
    async fn test_summary_and_teardown() {
        let manager = Arc::new(InMemorySandboxManager::default());
        let llm = Arc::new(ScriptedLlmClient::new(vec![Ok("All done.".into())]));
        let consolidator = Consolidator::new(llm.clone(), manager.clone());
        let mut cluster = cluster_with_result(&manager).await;
        let report = report_with_result(&cluster);

        let result = consolidator
            .consolidate("goal", &mut cluster, &report, Instant::now())
            .await;
        assert_eq!(result.summary, "All done.");
        assert!(!result.summary_degraded);
        assert_eq!(result.tasks_completed, 1);
        assert_eq!(result.agents_used, 1);
        assert_eq!(manager.live_count().await, 0);
        assert!(llm.prompts()[0].contains("wrote main.rs"));
    }

    #[tokio::test]
    async fn test_summarization_failure_uses_placeholder_and_still_tears_down() {
        let manager = Arc::new(InMemorySandboxManager::default());
        let llm = Arc::new(ScriptedLlmClient::new(vec![Err(LlmError::Request("down".into()))]));
        let consolidator = Consolidator::new(llm, manager.clone());
        let mut cluster = cluster_with_result(&manager).await;
        let report = report_with_result(&cluster);

        let result = consolidator
            .consolidate("goal", &mut cluster, &report, Instant::now())
            .await;
        assert_eq!(result.summary, SUMMARY_PLACEHOLDER);
        assert!(result.summary_degraded);
        assert_eq!(manager.live_count().await, 0);
    }

    #[tokio::test]
    async fn test_counts_results_from_report_when_agent_is_gone() {
        let manager = Arc::new(InMemorySandboxManager::default());
        let llm = Arc::new(ScriptedLlmClient::new(vec![Ok("Partial.".into())]));
        let consolidator = Consolidator::new(llm.clone(), manager.clone());
        let mut cluster = cluster_with_result(&manager).await;
        let report = report_with_result(&cluster);
        cluster.agents.clear();

        let result = consolidator
            .consolidate("goal", &mut cluster, &report, Instant::now())
            .await;
        assert_eq!(result.tasks_completed, 1);
        assert!(llm.prompts()[0].contains("wrote main.rs"));
    }
}
