//! 对话记录（Transcript）
//!
//! 有序消息列表，插入顺序即对话顺序，每一轮都原样作为后端输入。
//! 只允许追加；唯一的原地修改是流式生成时向最后一条消息追加内容。
//! 首条消息恒为 system（描述助手角色与工具调用协议）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 消息角色（与后端对话格式一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// 单条消息：id 与 role 创建后不可变，content 仅能经由 Transcript 修改
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    id: Uuid,
    role: Role,
    content: String,
    timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// 空的 assistant 消息（流式生成前追加的占位）
    pub fn is_placeholder(&self) -> bool {
        self.role == Role::Assistant && self.content.is_empty()
    }
}

/// 对话记录：首条为 system，之后按时间顺序追加
#[derive(Clone, Debug, Serialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// 重建为仅含一条新的 system 消息
    pub fn reset(&mut self, system_prompt: impl Into<String>) {
        self.messages = vec![Message::system(system_prompt)];
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// 向最后一条消息追加文本；记录为空时返回 false
    pub fn append_to_last(&mut self, text: &str) -> bool {
        match self.messages.last_mut() {
            Some(last) => {
                last.content.push_str(text);
                true
            }
            None => false,
        }
    }

    /// 若最后一条是空 assistant 占位则移除，返回是否移除
    pub fn remove_trailing_placeholder(&mut self) -> bool {
        // 首条 system 永不移除
        if self.messages.len() > 1 && self.messages.last().is_some_and(Message::is_placeholder) {
            self.messages.pop();
            true
        } else {
            false
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl From<Vec<Message>> for Transcript {
    /// 从快照恢复；保持首条 system 的约定由调用方负责
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}
