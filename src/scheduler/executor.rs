//! 执行调度：依赖组按序执行，组内任务在 JoinSet 上并发
//!
//! 每个任务：危险模式筛查 → 分配同专长的空闲 Agent（没有则 blocked，本次运行不重试）→ 安全闸门预检 → Agent 执行（沙箱超时）
//! → 安全闸门后检（脱敏）→ 结果写入全局记忆。
//! 可恢复错误只让当前任务失败；不可恢复错误（runner Fatal、worker panic）等本组在途任务结束后停止后续组。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::OrchestrationError;
use crate::memory::{GlobalMemory, MemoryEntry, MemoryEntryType};
use crate::plan::{MicroTask, TaskResult, TaskStatus};
use crate::safety::SafetyGate;
use crate::scheduler::groups::dependency_groups;
use crate::swarm::{Agent, AgentStatus, SwarmCluster};
use crate::worker::TaskRunner;

/// 未分配 Agent 即被拒绝的任务，结果中的 agent_id
const UNASSIGNED: &str = "unassigned";
const CANCELLED: &str = "cancelled";

/// 一次执行的结果：任务工作副本（含最终状态）、按完成顺序的结果、可能的运行级错误
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub tasks: Vec<MicroTask>,
    pub results: Vec<TaskResult>,
    pub error: Option<OrchestrationError>,
}

impl ExecutionReport {
    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn task(&self, id: &str) -> Option<&MicroTask> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

struct Finished {
    task_idx: usize,
    slot: usize,
    agent: Agent,
    result: TaskResult,
    fatal: Option<String>,
}

pub struct ExecutionScheduler {
    runner: Arc<dyn TaskRunner>,
    gate: Arc<SafetyGate>,
    memory: Arc<GlobalMemory>,
}

impl ExecutionScheduler {
    pub fn new(runner: Arc<dyn TaskRunner>, gate: Arc<SafetyGate>, memory: Arc<GlobalMemory>) -> Self {
        Self { runner, gate, memory }
    }

    pub async fn run(&self, cluster: &mut SwarmCluster, cancel: CancellationToken) -> ExecutionReport {
        let mut tasks: Vec<MicroTask> = cluster.plan.tasks().cloned().collect();
        // 重复 id 只映射到第一次出现的任务
        let mut index: HashMap<String, usize> = HashMap::new();
        for (i, t) in tasks.iter().enumerate() {
            index.entry(t.id.clone()).or_insert(i);
        }
        let grouping = dependency_groups(&tasks);

        for u in &grouping.unschedulable {
            tracing::warn!(cluster_id = %cluster.id, task_id = %u.task_id, reason = %u.reason, "Task cannot be scheduled");
            tasks[u.position].advance(TaskStatus::Blocked);
            self.memory
                .append(
                    MemoryEntry::new(MemoryEntryType::Warning, format!("Task {} blocked: {}", u.task_id, u.reason))
                        .with_meta("task_id", u.task_id.clone())
                        .with_meta("cluster_id", cluster.id.clone()),
                )
                .await;
        }

        let mut pool: Vec<Option<Agent>> = cluster.agents.drain(..).map(Some).collect();
        let mut results = Vec::new();
        let mut error = None;

        for (group_no, group) in grouping.groups.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            tracing::info!(cluster_id = %cluster.id, group = group_no, tasks = group.len(), "Executing dependency group");
            let mut set = JoinSet::new();

            for id in group {
                let task_idx = index[id];
                if let Some(unfinished) = tasks[task_idx]
                    .dependencies
                    .iter()
                    .find(|d| index.get(*d).map_or(true, |&i| !tasks[i].status.is_terminal()))
                {
                    tracing::warn!(task_id = %id, dependency = %unfinished, "Dependency not terminal, task blocked");
                    tasks[task_idx].advance(TaskStatus::Blocked);
                    continue;
                }

                if let Err(e) = self.gate.screen(&tasks[task_idx]) {
                    let result = self
                        .gate
                        .post_check(TaskResult::failed(id.clone(), UNASSIGNED, e.to_string()), &tasks[task_idx])
                        .await;
                    tasks[task_idx].advance(TaskStatus::Failed);
                    tasks[task_idx].result = Some(result.clone());
                    results.push(result);
                    continue;
                }

                // 无空闲的同专长 Agent：本次运行不再重试
                if !self.launch(task_idx, &mut tasks, &mut pool, &mut set, &cancel) {
                    tracing::warn!(task_id = %id, agent_type = %tasks[task_idx].task_type, "No idle matching agent, task blocked");
                    tasks[task_idx].advance(TaskStatus::Blocked);
                }
            }

            let mut fatal_errors = Vec::new();
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok(done) => {
                        let task = &mut tasks[done.task_idx];
                        task.advance(if done.result.is_success() {
                            TaskStatus::Completed
                        } else {
                            TaskStatus::Failed
                        });
                        task.result = Some(done.result.clone());
                        results.push(done.result);
                        pool[done.slot] = Some(done.agent);
                        if let Some(f) = done.fatal {
                            fatal_errors.push(f);
                        }
                    }
                    Err(e) => {
                        tracing::error!(cluster_id = %cluster.id, error = %e, "Worker task aborted");
                        fatal_errors.push(format!("worker aborted: {e}"));
                    }
                }
            }

            // panic 的 worker 无法回报，其任务停留在 assigned / in_progress
            for id in group {
                let task = &mut tasks[index[id]];
                if matches!(task.status, TaskStatus::Assigned | TaskStatus::InProgress) {
                    task.advance(TaskStatus::Failed);
                    let agent_id = task.assigned_agent.clone().unwrap_or_else(|| UNASSIGNED.to_string());
                    task.result = Some(TaskResult::failed(task.id.clone(), agent_id, "worker aborted"));
                }
            }

            if !fatal_errors.is_empty() {
                tracing::error!(cluster_id = %cluster.id, group = group_no, errors = ?fatal_errors, "Unrecoverable execution error, stopping");
                error = Some(OrchestrationError::ExecutionFailed(fatal_errors));
                break;
            }
        }

        if cancel.is_cancelled() && error.is_none() {
            for task in tasks.iter_mut().filter(|t| t.status == TaskStatus::Pending) {
                task.advance(TaskStatus::Failed);
                task.result = Some(TaskResult::failed(task.id.clone(), UNASSIGNED, CANCELLED));
            }
            tracing::warn!(cluster_id = %cluster.id, "Execution cancelled");
            error = Some(OrchestrationError::Cancelled);
        }

        cluster.agents = pool.into_iter().flatten().collect();

        let report = ExecutionReport { tasks, results, error };
        tracing::info!(
            cluster_id = %cluster.id,
            completed = report.count(TaskStatus::Completed),
            failed = report.count(TaskStatus::Failed),
            blocked = report.count(TaskStatus::Blocked),
            "Execution finished"
        );
        report
    }

    /// 为任务取第一个同专长的空闲 Agent 并在 JoinSet 上启动；没有空闲 Agent 时返回 false
    fn launch(
        &self,
        task_idx: usize,
        tasks: &mut [MicroTask],
        pool: &mut [Option<Agent>],
        set: &mut JoinSet<Finished>,
        cancel: &CancellationToken,
    ) -> bool {
        let task_type = tasks[task_idx].task_type;
        let Some(slot) = pool
            .iter()
            .position(|a| a.as_ref().is_some_and(|a| a.agent_type == task_type && a.is_available()))
        else {
            return false;
        };
        let Some(mut agent) = pool[slot].take() else {
            return false;
        };

        agent.assign();
        let task = &mut tasks[task_idx];
        task.assigned_agent = Some(agent.id.clone());
        task.advance(TaskStatus::Assigned);

        let mut task = task.clone();
        let runner = self.runner.clone();
        let gate = self.gate.clone();
        let memory = self.memory.clone();
        let cancel = cancel.clone();
        set.spawn(async move {
            task.advance(TaskStatus::InProgress);
            let mut fatal = None;
            let outcome = match gate.pre_check(&agent, &task) {
                Err(e) => TaskResult::failed(task.id.clone(), agent.id.clone(), e.to_string()),
                Ok(()) => {
                    let ran = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        r = agent.execute(runner.as_ref(), &task) => Some(r),
                    };
                    match ran {
                        None => TaskResult::failed(task.id.clone(), agent.id.clone(), CANCELLED),
                        Some(Ok(output)) => TaskResult::success(task.id.clone(), agent.id.clone(), output.content),
                        Some(Err(e)) => {
                            if e.is_fatal() {
                                fatal = Some(format!("task {}: {}", task.id, e));
                            }
                            TaskResult::failed(task.id.clone(), agent.id.clone(), e.to_string())
                        }
                    }
                }
            };
            if matches!(agent.status, AgentStatus::Assigned | AgentStatus::Working) {
                agent.status = if outcome.is_success() {
                    AgentStatus::Completed
                } else {
                    AgentStatus::Failed
                };
            }

            let result = gate.post_check(outcome, &task).await;
            agent.record(result.clone());
            memory
                .append(
                    MemoryEntry::new(MemoryEntryType::TaskResult, result.content.clone())
                        .with_meta("task_id", result.task_id.clone())
                        .with_meta("agent_id", result.agent_id.clone())
                        .with_meta("status", if result.is_success() { "success" } else { "failed" }),
                )
                .await;
            Finished {
                task_idx,
                slot,
                agent,
                result,
                fatal,
            }
        });
        tasks[task_idx].advance(TaskStatus::InProgress);
        true
    }
}
