//! 工具契约
//!
//! 工具实现 Tool trait（name / description / parameters_schema / execute），
//! 会话只挂载一个工具，由 ToolExecutor 加超时与审计日志后调用。

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::jobs::JobSearchError;

/// 工具描述符：名称、描述、参数 JSON Schema，随每轮生成一起交给后端
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 工具成功输出：写入 tool 消息的结果文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub tool_result: String,
}

impl ToolOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            tool_result: text.into(),
        }
    }
}

/// 工具失败（调用方可见，不会让编排循环崩溃）
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Job search failed: {0}")]
    JobSearch(#[from] JobSearchError),

    #[error("Tool timeout: {0}")]
    Timeout(String),

    #[error("Tool execution failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（对应 tool call 中的 "name"）
    fn name(&self) -> &str;

    /// 工具描述（供模型理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}
