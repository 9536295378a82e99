//! 工作者执行层：在沙箱内执行单个任务

pub mod runner;

pub use runner::{LlmTaskRunner, RunnerError, TaskOutput, TaskRunner};
