//! 沙箱策略：允许 / 禁止的操作集合、工作目录、网络与文件系统权限、命令白名单、资源上限
//!
//! 策略是不可变值；构造时从 allowed 中移除所有 denied 操作，两集合天然不相交（冲突时禁止优先）。

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::swarm::Specialization;

/// 操作种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Read,
    Write,
    Delete,
    Execute,
    Analyze,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::Delete => "delete",
            Operation::Execute => "execute",
            Operation::Analyze => "analyze",
        }
    }

    /// 宽松解析（规划输出中的操作名）
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "read" => Some(Operation::Read),
            "write" | "edit" | "create" => Some(Operation::Write),
            "delete" | "remove" => Some(Operation::Delete),
            "execute" | "exec" | "run" => Some(Operation::Execute),
            "analyze" | "analyse" | "review" => Some(Operation::Analyze),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 文件系统访问模式；Full 只能显式构造，配置器从不授予
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsAccess {
    ReadOnly,
    SandboxedWrite,
    Full,
}

/// 资源上限
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_memory_mb: u64,
    pub max_cpu_percent: u8,
    /// 单任务执行超时（秒）
    pub timeout_secs: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: 512,
            max_cpu_percent: 50,
            timeout_secs: 300,
        }
    }
}

/// 串联 / 管道 / 重定向 / 命令替换 / 换行
const SHELL_CONTROL_CHARS: &[char] = &[';', '|', '&', '<', '>', '`', '\n', '\r'];

fn has_shell_control(command: &str) -> bool {
    command.contains(SHELL_CONTROL_CHARS) || command.contains("$(")
}

/// 沙箱策略（不可变）
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SandboxPolicy {
    allowed: BTreeSet<Operation>,
    denied: BTreeSet<Operation>,
    working_dir: PathBuf,
    network: bool,
    fs_access: FsAccess,
    allowed_commands: Option<Vec<String>>,
    limits: ResourceLimits,
}

impl SandboxPolicy {
    /// 构造策略：denied 优先，allowed 中的同名操作被移除；未允许 execute 时丢弃命令白名单
    pub fn new(
        allowed: impl IntoIterator<Item = Operation>,
        denied: impl IntoIterator<Item = Operation>,
        fs_access: FsAccess,
    ) -> Self {
        let denied: BTreeSet<Operation> = denied.into_iter().collect();
        let allowed = allowed.into_iter().filter(|op| !denied.contains(op)).collect();
        Self {
            allowed,
            denied,
            working_dir: PathBuf::from("workspace"),
            network: false,
            fs_access,
            allowed_commands: None,
            limits: ResourceLimits::default(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_allowed_commands(mut self, commands: Vec<String>) -> Self {
        if self.allowed.contains(&Operation::Execute) {
            self.allowed_commands = Some(commands);
        }
        self
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// 各专长的默认策略（表驱动，见 Specialization::policy_template）
    pub fn for_specialization(
        spec: Specialization,
        limits: ResourceLimits,
        test_commands: &[String],
    ) -> Self {
        let template = spec.policy_template();
        let policy = SandboxPolicy::new(
            template.allowed.iter().copied(),
            template.denied.iter().copied(),
            template.fs_access,
        )
        .with_limits(limits);
        if template.test_runner_only {
            policy.with_allowed_commands(test_commands.to_vec())
        } else {
            policy
        }
    }

    pub fn allowed(&self) -> &BTreeSet<Operation> {
        &self.allowed
    }

    pub fn denied(&self) -> &BTreeSet<Operation> {
        &self.denied
    }

    pub fn working_dir(&self) -> &PathBuf {
        &self.working_dir
    }

    pub fn network(&self) -> bool {
        self.network
    }

    pub fn fs_access(&self) -> FsAccess {
        self.fs_access
    }

    pub fn allowed_commands(&self) -> Option<&[String]> {
        self.allowed_commands.as_deref()
    }

    pub fn limits(&self) -> ResourceLimits {
        self.limits
    }

    pub fn permits(&self, op: Operation) -> bool {
        !self.denied.contains(&op) && self.allowed.contains(&op)
    }

    /// 命令是否在白名单中（按命令前缀匹配，如 "cargo test --lib" 命中 "cargo test"）
    ///
    /// 带白名单时，含 shell 控制语法（串联、管道、重定向、命令替换）的命令一律拒绝。
    pub fn permits_command(&self, command: &str) -> bool {
        let Some(list) = &self.allowed_commands else {
            return self.permits(Operation::Execute);
        };
        if has_shell_control(command) {
            return false;
        }
        let normalized = command.split_whitespace().collect::<Vec<_>>().join(" ");
        list.iter().any(|allowed| {
            normalized == *allowed || normalized.starts_with(&format!("{} ", allowed))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tests_cmds() -> Vec<String> {
        vec!["cargo test".into(), "pytest".into()]
    }

    #[test]
    fn test_denied_wins_over_allowed() {
        let p = SandboxPolicy::new(
            [Operation::Read, Operation::Write],
            [Operation::Write],
            FsAccess::ReadOnly,
        );
        assert!(p.allowed().is_disjoint(p.denied()));
        assert!(!p.permits(Operation::Write));
        assert!(p.permits(Operation::Read));
    }

    #[test]
    fn test_deploy_policy_never_mutates() {
        for _ in 0..3 {
            let p = SandboxPolicy::for_specialization(
                Specialization::Deploy,
                ResourceLimits::default(),
                &tests_cmds(),
            );
            for op in [Operation::Write, Operation::Delete, Operation::Execute] {
                assert!(p.denied().contains(&op));
                assert!(!p.permits(op));
            }
            assert_eq!(p.fs_access(), FsAccess::ReadOnly);
            assert!(!p.network());
        }
    }

    #[test]
    fn test_code_policy_is_sandboxed_write() {
        let p = SandboxPolicy::for_specialization(Specialization::Code, ResourceLimits::default(), &[]);
        assert!(p.permits(Operation::Write));
        assert!(!p.permits(Operation::Execute));
        assert_eq!(p.fs_access(), FsAccess::SandboxedWrite);
        assert!(p.allowed_commands().is_none());
    }

    #[test]
    fn test_test_policy_has_runner_allowlist() {
        let p = SandboxPolicy::for_specialization(
            Specialization::Test,
            ResourceLimits::default(),
            &tests_cmds(),
        );
        assert!(p.permits(Operation::Execute));
        assert!(!p.permits(Operation::Write));
        assert!(p.permits_command("cargo test --lib"));
        assert!(p.permits_command("pytest"));
        assert!(!p.permits_command("cargo build"));
        assert!(!p.permits_command("cargo testx"));
    }

    #[test]
    fn test_allowlist_rejects_chained_commands() {
        let p = SandboxPolicy::for_specialization(
            Specialization::Test,
            ResourceLimits::default(),
            &tests_cmds(),
        );
        for command in [
            "cargo test && python deploy.py",
            "cargo test || true",
            "cargo test; rm -f x",
            "cargo test | tee out.log",
            "cargo test `rm -f x`",
            "cargo test $(cat args)",
            "cargo test > /tmp/out",
            "cargo test < input",
            "cargo test\npython deploy.py",
            "cargo test &",
        ] {
            assert!(!p.permits_command(command), "{command}");
        }
        assert!(p.permits_command("cargo test --lib -- --nocapture"));
    }

    #[test]
    fn test_no_specialization_gets_full_fs_access() {
        for spec in Specialization::ALL {
            let p = SandboxPolicy::for_specialization(spec, ResourceLimits::default(), &tests_cmds());
            assert_ne!(p.fs_access(), FsAccess::Full);
            assert!(p.allowed().is_disjoint(p.denied()));
        }
    }

    #[test]
    fn test_allowlist_dropped_without_execute() {
        let p = SandboxPolicy::new([Operation::Read], [], FsAccess::ReadOnly)
            .with_allowed_commands(vec!["ls".into()]);
        assert!(p.allowed_commands().is_none());
    }
}
