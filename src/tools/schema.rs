//! 工具调用协议与 Schema（schemars 自动生成调用格式）
//!
//! 文本协议：模型调用工具时只输出一个 `<tool_call>{"name": ..., "arguments": {...}}</tool_call>` 块。
//! 该说明与已挂载工具的描述符一起拼入 system 消息，减少格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};

use crate::tools::ToolSpec;

pub const TOOL_CALL_OPEN: &str = "<tool_call>";
pub const TOOL_CALL_CLOSE: &str = "</tool_call>";

/// 工具调用格式（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，如 get_todays_jobs
    pub name: String,
    /// 工具参数，按工具的 parameters schema 填写
    pub arguments: HashMap<String, serde_json::Value>,
}

/// 工具调用的 JSON Schema 字符串
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 拼入 system 消息的工具段落：可用工具 + 调用格式
pub fn tool_prompt_section(tools: &[ToolSpec]) -> String {
    if tools.is_empty() {
        return String::new();
    }
    let specs = serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string());
    format!(
        "# Tools\n\nAvailable tools:\n{specs}\n\n\
         To call a tool, reply with only one block:\n\
         {TOOL_CALL_OPEN}{{\"name\": \"<tool name>\", \"arguments\": {{...}}}}{TOOL_CALL_CLOSE}\n\n\
         Tool call JSON schema:\n{}",
        tool_call_schema_json()
    )
}
