//! 生成过程事件：供 REPL / 前端逐步展示文本增量、工具调用与观察

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 开始第 turn 轮流式生成（工具结果回灌后轮数 +1）
    TurnStarted { turn: usize },
    /// 模型输出的一段文本
    TextDelta { text: String },
    /// 后端上报的完成指标
    Completion { tokens_per_second: f64 },
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 超出单次生成允许的工具调用次数
    ToolLimitReached { limit: usize },
    Cancelled,
    /// 本次生成正常结束
    Done,
    /// 错误
    Error { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_tag() {
        let json = serde_json::to_value(ReactEvent::ToolLimitReached { limit: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "tool_limit_reached", "limit": 2}));
        let json = serde_json::to_value(ReactEvent::Done).unwrap();
        assert_eq!(json, serde_json::json!({"type": "done"}));
    }
}
