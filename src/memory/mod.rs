//! 会话记忆：对话记录与消息模型（仅内存，不做跨进程持久化）

pub mod transcript;

pub use transcript::{Message, Role, Transcript};
