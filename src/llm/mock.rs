//! Mock 生成后端（用于测试与无 API Key 时运行）
//!
//! 按轮排队的脚本：每次 open 取出一份脚本，由后台生产者经 channel 逐步发出事件；
//! 流被丢弃时生产者随之停止。脚本用尽时回显最后一条 user 消息。

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::llm::{
    CompletionInfo, GenerationBackend, GenerationEvent, GenerationStream, LlmError, LoadProgress,
    ToolCallRequest,
};
use crate::memory::{Message, Role};
use crate::tools::ToolSpec;

/// 脚本步骤
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Event(GenerationEvent),
    Delay(Duration),
    /// 以错误结束本次流
    Fail(LlmError),
    /// 挂起，直到消费方丢弃流
    Hang,
}

impl ScriptStep {
    pub fn text(delta: impl Into<String>) -> Self {
        ScriptStep::Event(GenerationEvent::TextDelta(delta.into()))
    }

    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        ScriptStep::Event(GenerationEvent::ToolCall(ToolCallRequest {
            name: name.into(),
            arguments,
        }))
    }

    pub fn info(generation_tokens: usize, generate_time: Duration) -> Self {
        ScriptStep::Event(GenerationEvent::CompletionInfo(CompletionInfo {
            prompt_tokens: 0,
            generation_tokens,
            prompt_time: Duration::ZERO,
            generate_time,
        }))
    }
}

#[derive(Default)]
pub struct MockBackend {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    open_failures: Mutex<VecDeque<LlmError>>,
    opened: Mutex<Vec<(Vec<Message>, Vec<ToolSpec>)>>,
    progress: Option<LoadProgress>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(self, steps: Vec<ScriptStep>) -> Self {
        self.push_script(steps);
        self
    }

    pub fn with_progress(mut self, progress: LoadProgress) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn push_script(&self, steps: Vec<ScriptStep>) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(steps);
    }

    /// 下一次 open 直接失败
    pub fn fail_next_open(&self, err: LlmError) {
        self.open_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(err);
    }

    /// 每次 open 收到的对话（按调用顺序）
    pub fn opened_histories(&self) -> Vec<Vec<Message>> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(messages, _)| messages.clone())
            .collect()
    }

    pub fn opened_tools(&self) -> Vec<Vec<ToolSpec>> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, tools)| tools.clone())
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn echo_script(messages: &[Message]) -> Vec<ScriptStep> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role() == Role::User)
            .map(|m| m.content())
            .unwrap_or("(no input)");
        vec![
            ScriptStep::text(format!("Echo from Mock: {last_user}")),
            ScriptStep::info(1, Duration::from_millis(1)),
        ]
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    async fn open(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<GenerationStream, LlmError> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((messages.to_vec(), tools.to_vec()));

        if let Some(err) = self
            .open_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
        {
            return Err(err);
        }

        let steps = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Self::echo_script(messages));

        // 容量 1：生产者与消费者步调一致
        let (tx, rx) = mpsc::channel::<Result<GenerationEvent, LlmError>>(1);
        tokio::spawn(async move {
            for step in steps {
                match step {
                    ScriptStep::Event(ev) => {
                        if tx.send(Ok(ev)).await.is_err() {
                            return;
                        }
                    }
                    ScriptStep::Delay(d) => {
                        tokio::select! {
                            _ = tokio::time::sleep(d) => {}
                            _ = tx.closed() => return,
                        }
                    }
                    ScriptStep::Fail(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                    ScriptStep::Hang => {
                        tx.closed().await;
                        return;
                    }
                }
            }
        });

        Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })))
    }

    fn load_progress(&self) -> Option<LoadProgress> {
        self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_scripted_events_in_order() {
        let backend = MockBackend::new().with_script(vec![
            ScriptStep::text("a"),
            ScriptStep::Delay(Duration::from_millis(5)),
            ScriptStep::text("b"),
        ]);
        let stream = backend.open(&[Message::system("s")], &[]).await.unwrap();
        let events: Vec<_> = stream.collect().await;
        assert_eq!(
            events,
            vec![
                Ok(GenerationEvent::TextDelta("a".into())),
                Ok(GenerationEvent::TextDelta("b".into())),
            ]
        );
        assert_eq!(backend.open_count(), 1);
    }

    #[tokio::test]
    async fn test_echo_when_no_script() {
        let backend = MockBackend::new();
        let history = [Message::system("s"), Message::user("hello")];
        let mut stream = backend.open(&history, &[]).await.unwrap();
        assert_eq!(
            stream.next().await,
            Some(Ok(GenerationEvent::TextDelta("Echo from Mock: hello".into())))
        );
    }

    #[tokio::test]
    async fn test_open_failure() {
        let backend = MockBackend::new();
        backend.fail_next_open(LlmError::ModelUnavailable("qwen".into()));
        assert!(backend.open(&[], &[]).await.is_err());
        assert!(backend.open(&[], &[]).await.is_ok());
    }
}
