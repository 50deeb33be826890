//! 生成后端抽象
//!
//! 后端实现 GenerationBackend：open(对话, 工具描述符) 返回惰性的生成事件流。
//! 丢弃返回的流即取消推理，后端不得有除中止推理之外的副作用。

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::memory::Message;
use crate::tools::ToolSpec;

/// 模型请求的工具调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// 一次生成的性能指标
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct CompletionInfo {
    pub prompt_tokens: usize,
    pub generation_tokens: usize,
    pub prompt_time: Duration,
    pub generate_time: Duration,
}

impl CompletionInfo {
    pub fn tokens_per_second(&self) -> f64 {
        let secs = self.generate_time.as_secs_f64();
        if secs > 0.0 {
            self.generation_tokens as f64 / secs
        } else {
            0.0
        }
    }
}

/// 生成事件；流结束即 end-of-stream
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    TextDelta(String),
    CompletionInfo(CompletionInfo),
    ToolCall(ToolCallRequest),
}

/// 模型加载 / 下载进度
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LoadProgress {
    pub completed: u64,
    pub total: u64,
}

impl LoadProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Stream interrupted: {0}")]
    Stream(String),

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),
}

pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<GenerationEvent, LlmError>> + Send>>;

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// 打开一次生成：传入完整对话与工具描述符（可能阻塞于模型加载）
    async fn open(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<GenerationStream, LlmError>;

    /// 模型下载进度；无需下载的后端返回 None
    fn load_progress(&self) -> Option<LoadProgress> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_per_second() {
        let info = CompletionInfo {
            prompt_tokens: 10,
            generation_tokens: 50,
            prompt_time: Duration::from_millis(100),
            generate_time: Duration::from_secs(2),
        };
        assert!((info.tokens_per_second() - 25.0).abs() < f64::EPSILON);
        assert_eq!(CompletionInfo::default().tokens_per_second(), 0.0);
    }

    #[test]
    fn test_tool_call_arguments_default() {
        let req: ToolCallRequest = serde_json::from_str(r#"{"name": "x"}"#).unwrap();
        assert_eq!(req.arguments, Value::Null);
    }
}
