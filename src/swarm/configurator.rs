//! Swarm 配置：根据计划阶段复杂度推导 Agent 需求
//!
//! High → architect×1 + code×2 + analysis×1；Medium → code×1 + test×1；Low → 阶段主类型×1。
//! 优先级随复杂度（High 3 / Medium 2 / Low 1）。阶段数超过阈值时标记为 hive 模式（仅标签）。
//! Agent 总数受 max_agents 限制，超出部分从列表尾部（靠后的阶段）裁掉。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SwarmSection;
use crate::plan::{Complexity, MasterPlan, Phase, PhaseId};
use crate::swarm::Specialization;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationMode {
    Swarm,
    Hive,
}

impl fmt::Display for CoordinationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CoordinationMode::Swarm => "swarm",
            CoordinationMode::Hive => "hive",
        })
    }
}

/// 安全级别；目前只有 strict 经过验证
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    #[default]
    Strict,
    Standard,
    Permissive,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentRequirement {
    pub agent_type: Specialization,
    pub count: usize,
    pub priority: u8,
    pub phase_id: PhaseId,
}

#[derive(Clone, Debug, Serialize)]
pub struct SwarmConfiguration {
    pub mode: CoordinationMode,
    pub requirements: Vec<AgentRequirement>,
    pub safety_level: SafetyLevel,
}

impl SwarmConfiguration {
    pub fn total_agents(&self) -> usize {
        self.requirements.iter().map(|r| r.count).sum()
    }
}

fn priority(complexity: Complexity) -> u8 {
    match complexity {
        Complexity::High => 3,
        Complexity::Medium => 2,
        Complexity::Low => 1,
    }
}

fn phase_template(phase: &Phase) -> Vec<(Specialization, usize)> {
    match phase.complexity {
        Complexity::High => vec![
            (Specialization::Architect, 1),
            (Specialization::Code, 2),
            (Specialization::Analysis, 1),
        ],
        Complexity::Medium => vec![(Specialization::Code, 1), (Specialization::Test, 1)],
        Complexity::Low => vec![(phase.primary_type, 1)],
    }
}

#[derive(Debug, Clone)]
pub struct SwarmConfigurator {
    max_agents: usize,
    hive_phase_threshold: usize,
    safety_level: SafetyLevel,
}

impl SwarmConfigurator {
    pub fn new(max_agents: usize, hive_phase_threshold: usize) -> Self {
        Self {
            max_agents,
            hive_phase_threshold,
            safety_level: SafetyLevel::Strict,
        }
    }

    pub fn from_config(section: &SwarmSection) -> Self {
        Self::new(section.max_agents, section.hive_phase_threshold).with_safety_level(section.safety_level)
    }

    pub fn with_safety_level(mut self, level: SafetyLevel) -> Self {
        if level != SafetyLevel::Strict {
            tracing::warn!(level = ?level, "Only the strict safety level is validated; continuing with strict checks");
        }
        self.safety_level = level;
        self
    }

    pub fn configure(&self, plan: &MasterPlan) -> SwarmConfiguration {
        let mode = if plan.phases.len() > self.hive_phase_threshold {
            CoordinationMode::Hive
        } else {
            CoordinationMode::Swarm
        };

        let mut requirements = Vec::new();
        let mut total = 0usize;
        let mut trimmed = 0usize;
        for phase in &plan.phases {
            for (agent_type, count) in phase_template(phase) {
                let granted = count.min(self.max_agents.saturating_sub(total));
                trimmed += count - granted;
                if granted == 0 {
                    continue;
                }
                total += granted;
                requirements.push(AgentRequirement {
                    agent_type,
                    count: granted,
                    priority: priority(phase.complexity),
                    phase_id: phase.id.clone(),
                });
            }
        }
        if trimmed > 0 {
            tracing::warn!(
                max_agents = self.max_agents,
                trimmed,
                "Agent requirements exceed the pool ceiling; later phases trimmed"
            );
        }

        tracing::info!(mode = %mode, agents = total, "Swarm configured");
        SwarmConfiguration {
            mode,
            requirements,
            safety_level: self.safety_level,
        }
    }
}

impl Default for SwarmConfigurator {
    fn default() -> Self {
        Self::from_config(&SwarmSection::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::MicroTask;

    fn phase(id: &str, complexity: Complexity, primary: Specialization) -> Phase {
        Phase {
            id: id.into(),
            name: id.into(),
            tasks: vec![MicroTask::new(format!("{id}-t"), "t", primary)],
            complexity,
            primary_type: primary,
        }
    }

    #[test]
    fn test_templates_per_complexity() {
        let plan = MasterPlan::new(
            "g",
            vec![
                phase("p1", Complexity::High, Specialization::Code),
                phase("p2", Complexity::Medium, Specialization::Code),
                phase("p3", Complexity::Low, Specialization::Documentation),
            ],
        );
        let config = SwarmConfigurator::new(16, 5).configure(&plan);
        assert_eq!(config.mode, CoordinationMode::Swarm);
        assert_eq!(config.total_agents(), 4 + 2 + 1);
        let last = config.requirements.last().unwrap();
        assert_eq!(last.agent_type, Specialization::Documentation);
        assert_eq!(last.priority, 1);
        assert_eq!(config.requirements[0].priority, 3);
        assert_eq!(config.safety_level, SafetyLevel::Strict);
    }

    #[test]
    fn test_hive_mode_above_threshold() {
        let phases = (0..6).map(|i| phase(&format!("p{i}"), Complexity::Low, Specialization::Code)).collect();
        let config = SwarmConfigurator::new(16, 5).configure(&MasterPlan::new("g", phases));
        assert_eq!(config.mode, CoordinationMode::Hive);
    }

    #[test]
    fn test_max_agents_trims_later_phases() {
        let plan = MasterPlan::new(
            "g",
            vec![
                phase("p1", Complexity::High, Specialization::Code),
                phase("p2", Complexity::Medium, Specialization::Code),
            ],
        );
        let config = SwarmConfigurator::new(5, 5).configure(&plan);
        assert_eq!(config.total_agents(), 5);
        let p2: Vec<_> = config.requirements.iter().filter(|r| r.phase_id == "p2").collect();
        assert_eq!(p2.len(), 1);
        assert_eq!(p2[0].agent_type, Specialization::Code);
    }

    #[test]
    fn test_safety_level_parses_from_config() {
        let level: SafetyLevel = serde_json::from_str("\"permissive\"").unwrap();
        assert_eq!(level, SafetyLevel::Permissive);
        assert_eq!(SafetyLevel::default(), SafetyLevel::Strict);
    }
}
