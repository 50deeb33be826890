//! 会话状态与快照投影
//!
//! SessionState 为会话独占的可变聚合（对话记录 + 工具轮数 + 取消标记），生成期间整体移入编排任务，
//! 任务结束时交还。观察方只读 SessionSnapshot：由 SessionPublisher 经 watch 通道发布，
//! 完成指标与错误信息只存在于快照中（最后写入者生效）。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::llm::CompletionInfo;
use crate::memory::{Message, Transcript};

/// 取消时追加到最后一条消息的标记
pub const CANCELLED_MARKER: &str = "\n[Cancelled]";

#[derive(Clone, Debug)]
pub struct SessionState {
    transcript: Transcript,
    tool_turns: usize,
    cancel_marked: bool,
}

impl SessionState {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            transcript: Transcript::new(system_prompt),
            tool_turns: 0,
            cancel_marked: false,
        }
    }

    /// 从快照中的消息恢复（任务异常退出、状态未交还时使用）
    pub fn restore(messages: Vec<Message>) -> Self {
        Self {
            transcript: Transcript::from(messages),
            tool_turns: 0,
            cancel_marked: false,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn tool_turns(&self) -> usize {
        self.tool_turns
    }

    /// 用户发起一次生成：计数清零，追加 user 消息与空 assistant 占位
    pub fn begin_generation(&mut self, user_input: &str) {
        self.tool_turns = 0;
        self.cancel_marked = false;
        self.transcript.push(Message::user(user_input));
        self.transcript.push(Message::assistant(""));
    }

    pub fn apply_delta(&mut self, text: &str) {
        self.transcript.append_to_last(text);
    }

    /// 工具调用计数 +1，返回新值
    pub fn register_tool_turn(&mut self) -> usize {
        self.tool_turns += 1;
        self.tool_turns
    }

    pub fn remove_placeholder(&mut self) -> bool {
        self.transcript.remove_trailing_placeholder()
    }

    /// 追加工具结果与下一轮的空占位
    pub fn push_tool_result(&mut self, result: &str) {
        self.transcript.push(Message::tool(result));
        self.transcript.push(Message::assistant(""));
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.transcript.push(Message::assistant(content));
    }

    /// 追加取消标记；同一次生成只追加一次，返回本次是否追加
    pub fn mark_cancelled(&mut self) -> bool {
        if self.cancel_marked {
            return false;
        }
        self.cancel_marked = true;
        self.transcript.append_to_last(CANCELLED_MARKER);
        true
    }

    pub fn reset(&mut self, system_prompt: &str) {
        self.transcript.reset(system_prompt);
        self.tool_turns = 0;
        self.cancel_marked = false;
    }
}

/// 观察方看到的只读投影
#[derive(Clone, Debug, Default, Serialize)]
pub struct SessionSnapshot {
    pub messages: Vec<Message>,
    pub is_generating: bool,
    pub completion: Option<CompletionInfo>,
    pub error_message: Option<String>,
}

impl SessionSnapshot {
    pub fn tokens_per_second(&self) -> f64 {
        self.completion
            .map(|info| info.tokens_per_second())
            .unwrap_or(0.0)
    }
}

/// 快照发布端（可克隆，编排任务与会话共享同一个 watch::Sender）
#[derive(Clone)]
pub struct SessionPublisher {
    tx: Arc<watch::Sender<SessionSnapshot>>,
}

impl SessionPublisher {
    pub fn new(state: &SessionState) -> Self {
        let (tx, _) = watch::channel(SessionSnapshot {
            messages: state.transcript().messages().to_vec(),
            ..SessionSnapshot::default()
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn publish_transcript(&self, state: &SessionState) {
        let messages = state.transcript().messages().to_vec();
        self.tx.send_modify(|s| s.messages = messages);
    }

    pub fn record_completion(&self, info: CompletionInfo) {
        self.tx.send_modify(|s| s.completion = Some(info));
    }

    pub fn clear_completion(&self) {
        self.tx.send_modify(|s| s.completion = None);
    }

    pub fn set_error(&self, message: Option<String>) {
        self.tx.send_modify(|s| s.error_message = message);
    }

    pub fn set_generating(&self, generating: bool) {
        self.tx.send_modify(|s| s.is_generating = generating);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Role;
    use std::time::Duration;

    #[test]
    fn test_begin_generation_resets_counter() {
        let mut state = SessionState::new("sys");
        state.register_tool_turn();
        state.register_tool_turn();
        state.begin_generation("hi");
        assert_eq!(state.tool_turns(), 0);
        let roles: Vec<Role> = state.transcript().messages().iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[test]
    fn test_mark_cancelled_once_per_generation() {
        let mut state = SessionState::new("sys");
        state.begin_generation("hi");
        state.apply_delta("partial");
        assert!(state.mark_cancelled());
        assert!(!state.mark_cancelled());
        assert_eq!(
            state.transcript().last().map(|m| m.content()),
            Some("partial\n[Cancelled]")
        );
        state.begin_generation("again");
        assert!(state.mark_cancelled());
    }

    #[test]
    fn test_publisher_tracks_meta() {
        let state = SessionState::new("sys");
        let publisher = SessionPublisher::new(&state);
        let rx = publisher.subscribe();
        publisher.record_completion(CompletionInfo {
            prompt_tokens: 1,
            generation_tokens: 10,
            prompt_time: Duration::ZERO,
            generate_time: Duration::from_secs(1),
        });
        assert_eq!(rx.borrow().tokens_per_second(), 10.0);
        publisher.clear_completion();
        assert_eq!(publisher.snapshot().tokens_per_second(), 0.0);
        assert_eq!(publisher.snapshot().messages.len(), 1);
    }
}
