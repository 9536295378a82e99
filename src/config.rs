//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__SWARM__MAX_AGENTS=8`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::llm::RetryConfig;
use crate::sandbox::ResourceLimits;
use crate::swarm::SafetyLevel;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub swarm: SwarmSection,
    pub sandbox: SandboxSection,
    pub safety: SafetySection,
}

/// [app] 段：应用名、沙箱工作目录根
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 沙箱工作目录根，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
}

impl AppSection {
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("workspace"))
    }
}

/// [llm] 段：后端选择、超时与重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock；优先级由 API Key 与 provider 共同决定
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub deepseek: LlmModelSection,
    #[serde(default)]
    pub openai: LlmModelSection,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
    #[serde(default)]
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            deepseek: LlmModelSection::default(),
            openai: LlmModelSection::default(),
            timeouts: LlmTimeoutsSection::default(),
            retry: LlmRetrySection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmModelSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [llm.retry] 段：外部协作方自身的重试策略
#[derive(Debug, Clone, Deserialize)]
pub struct LlmRetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_delay_ms() -> u64 {
    500
}

impl LlmSection {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry.max_retries,
            base_delay_ms: self.retry.base_delay_ms,
            request_timeout_secs: self.timeouts.request,
        }
    }
}

/// [swarm] 段：Agent 池上限、hive 模式阈值、全局记忆容量、安全级别
#[derive(Debug, Clone, Deserialize)]
pub struct SwarmSection {
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    /// 阶段数超过该值时标记为 hive 模式（仅标签）
    #[serde(default = "default_hive_phase_threshold")]
    pub hive_phase_threshold: usize,
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
    #[serde(default)]
    pub safety_level: SafetyLevel,
}

impl Default for SwarmSection {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            hive_phase_threshold: default_hive_phase_threshold(),
            memory_capacity: default_memory_capacity(),
            safety_level: SafetyLevel::default(),
        }
    }
}

fn default_max_agents() -> usize {
    16
}

fn default_hive_phase_threshold() -> usize {
    5
}

fn default_memory_capacity() -> usize {
    1000
}

/// [sandbox] 段：资源上限、存活沙箱上限、测试命令白名单
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxSection {
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,
    #[serde(default = "default_max_cpu_percent")]
    pub max_cpu_percent: u8,
    /// 单任务执行超时（秒）
    #[serde(default = "default_task_timeout_secs")]
    pub timeout_secs: u64,
    /// 同时存活的沙箱数量上限，None 表示不限
    pub max_live: Option<usize>,
    #[serde(default = "default_test_commands")]
    pub test_commands: Vec<String>,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            max_memory_mb: default_max_memory_mb(),
            max_cpu_percent: default_max_cpu_percent(),
            timeout_secs: default_task_timeout_secs(),
            max_live: None,
            test_commands: default_test_commands(),
        }
    }
}

fn default_max_memory_mb() -> u64 {
    512
}

fn default_max_cpu_percent() -> u8 {
    50
}

fn default_task_timeout_secs() -> u64 {
    300
}

fn default_test_commands() -> Vec<String> {
    vec![
        "cargo test".into(),
        "cargo nextest".into(),
        "npm test".into(),
        "pnpm test".into(),
        "yarn test".into(),
        "pytest".into(),
        "go test".into(),
    ]
}

impl SandboxSection {
    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            max_memory_mb: self.max_memory_mb,
            max_cpu_percent: self.max_cpu_percent,
            timeout_secs: self.timeout_secs,
        }
    }
}

/// [safety] 段：在内置危险模式之外追加的正则
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SafetySection {
    #[serde(default)]
    pub extra_dangerous_patterns: Vec<String>,
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
