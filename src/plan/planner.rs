//! Planner：把高层目标分解为 MasterPlan
//!
//! 发送结构化提示词给 LLM，对返回文本做尽力解析（围栏 / 前后缀文本中提取 JSON、缺省字段补默认值、
//! 重复或空 id 重新编号、计划级依赖并入任务依赖、空阶段补一个任务）。
//! 完全无法结构化时退化为单阶段单任务计划，并写入 warning 记忆条目。

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::core::OrchestrationError;
use crate::llm::mock::GOAL_MARKER;
use crate::llm::{LlmClient, Message};
use crate::memory::{GlobalMemory, MemoryEntry, MemoryEntryType};
use crate::plan::types::{Complexity, MasterPlan, MicroTask, Phase};
use crate::sandbox::Operation;
use crate::swarm::Specialization;

const PLANNER_SYSTEM_PROMPT: &str = "You are the planning module of a multi-agent orchestrator. \
Decompose goals into phases of small, independently executable micro-tasks. \
Respond with a single JSON object and nothing else.";

fn build_prompt(goal: &str) -> String {
    let types: Vec<&str> = Specialization::ALL.iter().map(|s| s.as_str()).collect();
    format!(
        "{GOAL_MARKER}\n{goal}\n\n\
## Instructions\n\
1. Decompose the goal into ordered phases; each phase holds micro-tasks (effort 1-5).\n\
2. Give every task a specialization, one of: {types}.\n\
3. Declare ordering through task `dependencies` (ids of earlier tasks).\n\
4. Safety: never plan privilege escalation, recursive deletes or piping downloads into a shell.\n\
   Code tasks write files, test tasks run test runners only, everything else is read-only.\n\
5. List measurable success criteria.\n\n\
## Output format\n\
{{\"phases\": [{{\"id\": \"phase-1\", \"name\": \"...\", \"complexity\": \"low|medium|high\", \"primary_type\": \"code\",\n\
  \"tasks\": [{{\"id\": \"task-1\", \"title\": \"...\", \"description\": \"...\", \"type\": \"code\", \"operation\": \"write\",\n\
  \"effort\": 2, \"estimated_duration\": \"30m\", \"dependencies\": [], \"deliverable\": \"...\", \"command\": null}}]}}],\n\
 \"dependencies\": [{{\"task_id\": \"task-2\", \"depends_on\": [\"task-1\"]}}],\n\
 \"estimated_duration\": \"...\", \"success_criteria\": [\"...\"]}}\n",
        types = types.join(", ")
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlan {
    phases: Vec<RawPhase>,
    dependencies: Vec<RawDependency>,
    estimated_duration: Option<String>,
    success_criteria: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPhase {
    id: Option<Value>,
    name: Option<String>,
    complexity: Option<String>,
    primary_type: Option<String>,
    tasks: Vec<RawTask>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTask {
    id: Option<Value>,
    title: Option<String>,
    description: Option<String>,
    #[serde(rename = "type", alias = "task_type", alias = "specialization")]
    task_type: Option<String>,
    operation: Option<String>,
    effort: Option<Value>,
    estimated_duration: Option<String>,
    dependencies: Vec<Value>,
    deliverable: Option<String>,
    command: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDependency {
    task_id: Option<Value>,
    depends_on: Vec<Value>,
}

/// id 字段允许字符串或数字
fn id_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn effort_value(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 从 LLM 输出中截取 JSON 对象（```json 围栏或首个 '{' 至最后一个 '}'）
fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest).trim();
        if body.starts_with('{') {
            return Some(body);
        }
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 分配唯一 id：缺失或重复时按 `{prefix}-{n}` 重新编号
fn unique_id(candidate: Option<String>, prefix: &str, ordinal: usize, used: &mut HashSet<String>) -> String {
    if let Some(id) = candidate {
        if used.insert(id.clone()) {
            return id;
        }
    }
    let mut n = ordinal;
    loop {
        let id = format!("{prefix}-{n}");
        if used.insert(id.clone()) {
            return id;
        }
        n += 1;
    }
}

/// 尽力把 LLM 输出结构化为计划；没有任何阶段时返回 None
pub(crate) fn parse_plan(goal: &str, output: &str) -> Option<MasterPlan> {
    let json = extract_json(output)?;
    let raw: RawPlan = serde_json::from_str(json).ok()?;
    if raw.phases.is_empty() {
        return None;
    }

    let mut phase_ids = HashSet::new();
    let mut task_ids = HashSet::new();
    let mut task_ordinal = 0usize;
    let mut phases = Vec::with_capacity(raw.phases.len());

    for (pi, raw_phase) in raw.phases.into_iter().enumerate() {
        let phase_id = unique_id(raw_phase.id.as_ref().and_then(id_string), "phase", pi + 1, &mut phase_ids);
        let name = raw_phase
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Phase {}", pi + 1));
        let complexity = raw_phase
            .complexity
            .as_deref()
            .and_then(Complexity::parse)
            .unwrap_or(Complexity::Medium);
        let primary_type = raw_phase
            .primary_type
            .as_deref()
            .and_then(Specialization::parse)
            .or_else(|| {
                raw_phase
                    .tasks
                    .iter()
                    .find_map(|t| t.task_type.as_deref().and_then(Specialization::parse))
            })
            .unwrap_or(Specialization::Code);

        let mut tasks = Vec::with_capacity(raw_phase.tasks.len().max(1));
        for raw_task in raw_phase.tasks {
            task_ordinal += 1;
            let id = unique_id(raw_task.id.as_ref().and_then(id_string), "task", task_ordinal, &mut task_ids);
            let task_type = raw_task
                .task_type
                .as_deref()
                .and_then(Specialization::parse)
                .unwrap_or(primary_type);
            let title = raw_task
                .title
                .filter(|t| !t.trim().is_empty())
                .or_else(|| raw_task.description.clone())
                .unwrap_or_else(|| format!("{} task {}", name, task_ordinal));
            let mut task = MicroTask::new(id, title, task_type);
            if let Some(desc) = raw_task.description.filter(|d| !d.trim().is_empty()) {
                task = task.with_description(desc);
            }
            if let Some(op) = raw_task.operation.as_deref().and_then(Operation::parse) {
                task = task.with_operation(op);
            }
            if let Some(effort) = raw_task.effort.as_ref().and_then(effort_value) {
                task = task.with_effort(effort);
            }
            if let Some(d) = raw_task.estimated_duration.filter(|d| !d.trim().is_empty()) {
                task.estimated_duration = d;
            }
            task = task.with_dependencies(raw_task.dependencies.iter().filter_map(id_string).collect());
            if let Some(d) = raw_task.deliverable.filter(|d| !d.trim().is_empty()) {
                task = task.with_deliverable(d);
            }
            if let Some(c) = raw_task.command.filter(|c| !c.trim().is_empty()) {
                task = task.with_command(c);
            }
            tasks.push(task);
        }

        if tasks.is_empty() {
            task_ordinal += 1;
            let id = unique_id(None, "task", task_ordinal, &mut task_ids);
            tasks.push(MicroTask::new(id, name.clone(), primary_type).with_description(format!("{name}: {goal}")));
        }

        phases.push(Phase {
            id: phase_id,
            name,
            tasks,
            complexity,
            primary_type,
        });
    }

    // 计划级依赖边并入任务依赖
    for edge in &raw.dependencies {
        let Some(task_id) = edge.task_id.as_ref().and_then(id_string) else {
            continue;
        };
        if let Some(task) = phases.iter_mut().flat_map(|p| p.tasks.iter_mut()).find(|t| t.id == task_id) {
            task.dependencies.extend(edge.depends_on.iter().filter_map(id_string));
        }
    }
    for task in phases.iter_mut().flat_map(|p| p.tasks.iter_mut()) {
        let own = task.id.clone();
        let mut seen = HashSet::new();
        task.dependencies.retain(|d| *d != own && seen.insert(d.clone()));
    }

    let mut plan = MasterPlan::new(goal, phases);
    plan.estimated_duration = raw.estimated_duration.unwrap_or_default();
    plan.success_criteria = raw.success_criteria;
    Some(plan)
}

/// 无法结构化时的默认计划：一个 Medium 阶段，一个以目标为描述的 code 任务
pub(crate) fn fallback_plan(goal: &str) -> MasterPlan {
    let task = MicroTask::new("task-1", goal, Specialization::Code).with_description(goal);
    let phase = Phase {
        id: "phase-1".to_string(),
        name: "Execution".to_string(),
        tasks: vec![task],
        complexity: Complexity::Medium,
        primary_type: Specialization::Code,
    };
    let mut plan = MasterPlan::new(goal, vec![phase]);
    plan.success_criteria = vec![format!("Goal achieved: {goal}")];
    plan
}

/// Planner：持有 LLM，负责 goal → MasterPlan
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    memory: Option<Arc<GlobalMemory>>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm, memory: None }
    }

    /// 退化计划的 warning 写入全局记忆
    pub fn with_memory(mut self, memory: Arc<GlobalMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub async fn plan(&self, goal: &str) -> Result<MasterPlan, OrchestrationError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(OrchestrationError::InvalidGoal("goal is empty".to_string()));
        }

        let messages = vec![Message::system(PLANNER_SYSTEM_PROMPT), Message::user(build_prompt(goal))];
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| OrchestrationError::PlanningFailed(e.to_string()))?;

        if let Some(plan) = parse_plan(goal, &output) {
            tracing::info!(
                plan_id = %plan.id,
                phases = plan.phases.len(),
                tasks = plan.task_count(),
                "Master plan created"
            );
            return Ok(plan);
        }

        let preview: String = output.chars().take(200).collect();
        tracing::warn!(goal = %goal, output = %preview, "Planner output unstructured, using fallback plan");
        if let Some(memory) = &self.memory {
            memory
                .append(
                    MemoryEntry::new(MemoryEntryType::Warning, "Planner output could not be structured; using fallback plan")
                        .with_meta("goal", goal)
                        .with_meta("output_preview", preview),
                )
                .await;
        }
        Ok(fallback_plan(goal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient, ScriptedLlmClient};

    #[test]
    fn test_extract_json_from_fence_and_prose() {
        let fenced = "Here you go:\n```json\n{\"phases\": []}\n```\nthanks";
        assert_eq!(extract_json(fenced), Some("{\"phases\": []}"));
        let prose = "Plan: {\"a\": 1} done";
        assert_eq!(extract_json(prose), Some("{\"a\": 1}"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_parse_renumbers_duplicate_and_missing_ids() {
        let out = r#"{"phases":[{"name":"P","complexity":"high","tasks":[
            {"id":"t","title":"A","type":"code"},
            {"id":"t","title":"B","type":"tester"},
            {"title":"C"}
        ]}]}"#;
        let plan = parse_plan("g", out).unwrap();
        let ids: Vec<&str> = plan.tasks().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t", "task-2", "task-3"]);
        assert_eq!(plan.phases[0].id, "phase-1");
        assert_eq!(plan.phases[0].complexity, Complexity::High);
        assert_eq!(plan.tasks().nth(1).unwrap().task_type, Specialization::Test);
        // 缺省类型取阶段主类型（首个可解析任务类型）
        assert_eq!(plan.tasks().nth(2).unwrap().task_type, Specialization::Code);
    }

    #[test]
    fn test_parse_merges_plan_level_edges_and_synthesizes_tasks() {
        let out = r#"{"phases":[
            {"id":"p1","primary_type":"research","tasks":[{"id":"a","title":"A","effort":"9"}]},
            {"id":"p2","primary_type":"documentation","tasks":[]}
        ],
        "dependencies":[{"task_id":"a","depends_on":["a"]}],
        "success_criteria":["done"]}"#;
        let plan = parse_plan("write docs", out).unwrap();
        assert_eq!(plan.task_count(), 2);
        let a = plan.task("a").unwrap();
        assert!(a.dependencies.is_empty(), "self edge dropped");
        assert_eq!(a.effort, 5);
        let synthesized = &plan.phases[1].tasks[0];
        assert_eq!(synthesized.task_type, Specialization::Documentation);
        assert_eq!(plan.success_criteria, vec!["done".to_string()]);
    }

    #[test]
    fn test_plan_level_edges_become_task_dependencies() {
        let out = r#"{"phases":[{"tasks":[{"id":"a","title":"A"},{"id":"b","title":"B","dependencies":[1]}]}],
            "dependencies":[{"task_id":"b","depends_on":["a"]}]}"#;
        let plan = parse_plan("g", out).unwrap();
        assert_eq!(plan.task("b").unwrap().dependencies, vec!["1".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_goal_rejected() {
        let planner = Planner::new(Arc::new(MockLlmClient));
        let err = planner.plan("   ").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidGoal(_)));
    }

    #[tokio::test]
    async fn test_llm_error_is_planning_failed() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![Err(LlmError::Request("boom".into()))]));
        let planner = Planner::new(llm.clone());
        let err = planner.plan("build it").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::PlanningFailed(_)));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_unstructured_output_falls_back_with_warning() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![Ok("I cannot plan this.".into())]));
        let memory = Arc::new(GlobalMemory::new(10));
        let planner = Planner::new(llm).with_memory(memory.clone());
        let plan = planner.plan("ship the feature").await.unwrap();
        assert_eq!(plan.phases.len(), 1);
        assert_eq!(plan.phases[0].complexity, Complexity::Medium);
        let task = &plan.phases[0].tasks[0];
        assert_eq!(task.task_type, Specialization::Code);
        assert_eq!(task.description, "ship the feature");
        assert_eq!(memory.by_type(MemoryEntryType::Warning).await.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_plan_round_trip() {
        let planner = Planner::new(Arc::new(MockLlmClient));
        let plan = planner.plan("Create a hello endpoint").await.unwrap();
        assert_eq!(plan.goal, "Create a hello endpoint");
        assert_eq!(plan.task_count(), 1);
        assert_eq!(plan.phases[0].complexity, Complexity::Low);
    }

    #[tokio::test]
    async fn test_prompt_carries_goal_marker() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![Ok("{}".into())]));
        let planner = Planner::new(llm.clone());
        let _ = planner.plan("refactor parser").await.unwrap();
        let prompts = llm.prompts();
        assert!(prompts.iter().any(|p| p.contains("## Goal\nrefactor parser")));
    }
}
