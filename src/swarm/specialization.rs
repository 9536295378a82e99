//! Agent 专长：枚举 + 查找表
//!
//! 专长 → 默认沙箱策略模板、默认所需操作、展示元数据、工作者 system prompt，全部由表驱动，新增专长只需补表。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sandbox::{FsAccess, Operation};

/// Agent / 任务专长
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Specialization {
    Architect,
    Code,
    Research,
    Analysis,
    Test,
    Deploy,
    Documentation,
    Review,
}

/// 沙箱策略模板（由 SandboxPolicy::for_specialization 实例化）
#[derive(Debug)]
pub struct PolicyTemplate {
    pub allowed: &'static [Operation],
    pub denied: &'static [Operation],
    pub fs_access: FsAccess,
    /// 是否启用测试运行器命令白名单
    pub test_runner_only: bool,
}

/// 展示元数据，供日志与外部展示层使用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMeta {
    pub label: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
}

const READ_ONLY: PolicyTemplate = PolicyTemplate {
    allowed: &[Operation::Read, Operation::Analyze],
    denied: &[Operation::Write, Operation::Delete, Operation::Execute],
    fs_access: FsAccess::ReadOnly,
    test_runner_only: false,
};

const CODE: PolicyTemplate = PolicyTemplate {
    allowed: &[Operation::Read, Operation::Write, Operation::Analyze],
    denied: &[Operation::Delete, Operation::Execute],
    fs_access: FsAccess::SandboxedWrite,
    test_runner_only: false,
};

const TEST: PolicyTemplate = PolicyTemplate {
    allowed: &[Operation::Read, Operation::Analyze, Operation::Execute],
    denied: &[Operation::Write, Operation::Delete],
    fs_access: FsAccess::ReadOnly,
    test_runner_only: true,
};

impl Specialization {
    pub const ALL: [Specialization; 8] = [
        Specialization::Architect,
        Specialization::Code,
        Specialization::Research,
        Specialization::Analysis,
        Specialization::Test,
        Specialization::Deploy,
        Specialization::Documentation,
        Specialization::Review,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Specialization::Architect => "architect",
            Specialization::Code => "code",
            Specialization::Research => "research",
            Specialization::Analysis => "analysis",
            Specialization::Test => "test",
            Specialization::Deploy => "deploy",
            Specialization::Documentation => "documentation",
            Specialization::Review => "review",
        }
    }

    /// 宽松解析规划输出中的专长名（coder / tester / analyst 等别名）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "architect" | "architecture" | "design" => Some(Specialization::Architect),
            "code" | "coder" | "coding" | "implementation" | "developer" => {
                Some(Specialization::Code)
            }
            "research" | "researcher" => Some(Specialization::Research),
            "analysis" | "analyst" | "analyze" | "analyse" => Some(Specialization::Analysis),
            "test" | "tester" | "testing" | "qa" => Some(Specialization::Test),
            "deploy" | "deployment" | "devops" | "ops" => Some(Specialization::Deploy),
            "documentation" | "docs" | "doc" | "writer" => Some(Specialization::Documentation),
            "review" | "reviewer" | "code_review" => Some(Specialization::Review),
            _ => None,
        }
    }

    pub fn policy_template(self) -> &'static PolicyTemplate {
        match self {
            Specialization::Code => &CODE,
            Specialization::Test => &TEST,
            // deploy 与其余专长同为只读模板
            _ => &READ_ONLY,
        }
    }

    /// 规划未声明操作时任务默认需要的操作
    pub fn default_operation(self) -> Operation {
        match self {
            Specialization::Code => Operation::Write,
            Specialization::Test => Operation::Execute,
            _ => Operation::Analyze,
        }
    }

    pub fn display(self) -> DisplayMeta {
        let (label, icon, color) = match self {
            Specialization::Architect => ("Architect", "🏛", "magenta"),
            Specialization::Code => ("Coder", "💻", "blue"),
            Specialization::Research => ("Researcher", "🔎", "cyan"),
            Specialization::Analysis => ("Analyst", "📊", "yellow"),
            Specialization::Test => ("Tester", "🧪", "green"),
            Specialization::Deploy => ("Deployer", "🚀", "red"),
            Specialization::Documentation => ("Writer", "📝", "white"),
            Specialization::Review => ("Reviewer", "👀", "gray"),
        };
        DisplayMeta { label, icon, color }
    }

    /// 工作者 Agent 的 system prompt
    pub fn worker_prompt(self) -> &'static str {
        match self {
            Specialization::Architect => {
                "You are a software architect agent. Produce a concise design: components, interfaces, data flow and risks."
            }
            Specialization::Code => {
                "You are a coding agent. Produce the code changes required by the task, as complete files or unified diffs."
            }
            Specialization::Research => {
                "You are a research agent. Gather and summarize the facts needed for the task, citing sources when known."
            }
            Specialization::Analysis => {
                "You are an analysis agent. Analyze the task's subject and report findings, trade-offs and recommendations."
            }
            Specialization::Test => {
                "You are a testing agent. Describe the test cases, the test-runner invocation and the expected results."
            }
            Specialization::Deploy => {
                "You are a deployment agent with read-only access. Produce a deployment plan and checklist; never mutate state."
            }
            Specialization::Documentation => {
                "You are a documentation agent. Write clear documentation for the task's subject in Markdown."
            }
            Specialization::Review => {
                "You are a code review agent. Review the task's subject and list concrete issues and suggested fixes."
            }
        }
    }
}

impl fmt::Display for Specialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(Specialization::parse("Coder"), Some(Specialization::Code));
        assert_eq!(Specialization::parse("tester"), Some(Specialization::Test));
        assert_eq!(Specialization::parse("analyst"), Some(Specialization::Analysis));
        assert_eq!(Specialization::parse("wizard"), None);
    }

    #[test]
    fn test_as_str_round_trips_through_parse() {
        for spec in Specialization::ALL {
            assert_eq!(Specialization::parse(spec.as_str()), Some(spec));
        }
    }

    #[test]
    fn test_default_operation_is_permitted_by_own_template() {
        for spec in Specialization::ALL {
            let t = spec.policy_template();
            assert!(t.allowed.contains(&spec.default_operation()), "{spec}");
        }
    }
}
