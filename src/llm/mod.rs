//! 生成后端层：事件流抽象与实现（OpenAI 兼容流式 / Mock 脚本）

pub mod mock;
pub mod openai;
pub mod tool_call;
pub mod traits;

pub use mock::{MockBackend, ScriptStep};
pub use openai::OpenAiBackend;
pub use tool_call::{parse_tool_call, text_event_stream, ToolCallDetector};
pub use traits::{
    CompletionInfo, GenerationBackend, GenerationEvent, GenerationStream, LlmError, LoadProgress,
    ToolCallRequest,
};
