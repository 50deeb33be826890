//! 编排层错误类型
//!
//! 在会话任务的最外层被捕获，转为一条可读的会话错误信息，不会让进程崩溃。

use thiserror::Error;

use crate::llm::LlmError;
use crate::tools::ToolError;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    #[error("{0}")]
    Tool(#[from] ToolError),

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),
}
