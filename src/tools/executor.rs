//! 工具执行器（Tool Gateway）
//!
//! 持有会话唯一的工具与单次调用超时；execute(request) 先校验工具名，再在超时内执行，
//! 失败统一转 AgentError（HallucinatedTool / Tool）；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::ToolCallRequest;
use crate::tools::{Tool, ToolError, ToolOutput, ToolSpec};

pub struct ToolExecutor {
    tool: Arc<dyn Tool>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(tool: Arc<dyn Tool>, timeout_secs: u64) -> Self {
        Self {
            tool,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn name(&self) -> &str {
        self.tool.name()
    }

    pub fn spec(&self) -> ToolSpec {
        self.tool.spec()
    }

    /// 执行工具调用；工具名不符返回 HallucinatedTool，超时返回 ToolError::Timeout
    pub async fn execute(&self, request: &ToolCallRequest) -> Result<ToolOutput, AgentError> {
        if request.name != self.tool.name() {
            return Err(AgentError::HallucinatedTool(request.name.clone()));
        }

        let start = Instant::now();
        let args_preview = args_preview(&request.arguments);
        let result = timeout(self.timeout, self.tool.execute(request.arguments.clone())).await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": request.name,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(AgentError::Tool(e)),
            Err(_) => Err(AgentError::Tool(ToolError::Timeout(request.name.clone()))),
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
