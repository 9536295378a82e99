//! Hive 命令行入口
//!
//! 用法：`hive <goal...>`，输出 JSON 格式的编排结果。Ctrl+C 取消在途运行。

use anyhow::Context;
use hive::{config::load_config, observability, Queen};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let goal = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if goal.trim().is_empty() {
        anyhow::bail!("usage: hive <goal>");
    }

    let config_path = std::env::var("HIVE_CONFIG").ok().map(std::path::PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config ({}), using defaults", e);
        Default::default()
    });

    let queen = Queen::builder(cfg).build();
    queen.supervisor().cancel_on_ctrl_c();

    let result = queen
        .orchestrate(&goal)
        .await
        .context("Orchestration failed")?;

    let json = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
    println!("{json}");
    Ok(())
}
