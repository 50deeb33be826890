//! 会话门面：调用方的唯一入口
//!
//! 持有输入框 prompt、会话监管与快照发布端。generate 取消旧任务后启动新任务；
//! 观察方通过 subscribe() 拿到 watch::Receiver，或直接读取访问器（均来自最新快照）。
//! 任务内的错误在任务边界被捕获，写入快照的 error_message，不会向调用方抛出。

use std::ops::BitOr;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::core::{SessionPublisher, SessionSnapshot, SessionState, SessionSupervisor};
use crate::llm::GenerationBackend;
use crate::memory::Message;
use crate::react::{run_generation, ReactEvent, TurnContext, TurnOutcome};
use crate::tools::ToolExecutor;

/// clear 的选项集合，可用 `|` 组合
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearOptions {
    pub prompt: bool,
    pub chat: bool,
    pub meta: bool,
}

impl ClearOptions {
    pub const PROMPT: Self = Self {
        prompt: true,
        chat: false,
        meta: false,
    };
    pub const CHAT: Self = Self {
        prompt: false,
        chat: true,
        meta: false,
    };
    pub const META: Self = Self {
        prompt: false,
        chat: false,
        meta: true,
    };
    pub const ALL: Self = Self {
        prompt: true,
        chat: true,
        meta: true,
    };
}

impl BitOr for ClearOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            prompt: self.prompt || rhs.prompt,
            chat: self.chat || rhs.chat,
            meta: self.meta || rhs.meta,
        }
    }
}

/// 生成任务共享的只读依赖
struct SessionRuntime {
    backend: Arc<dyn GenerationBackend>,
    executor: ToolExecutor,
    system_prompt: String,
    max_tool_turns: usize,
}

pub struct ChatSession {
    runtime: Arc<SessionRuntime>,
    prompt: String,
    supervisor: SessionSupervisor,
    publisher: SessionPublisher,
    event_tx: Option<mpsc::UnboundedSender<ReactEvent>>,
}

impl ChatSession {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        executor: ToolExecutor,
        system_prompt: impl Into<String>,
        max_tool_turns: usize,
    ) -> Self {
        let system_prompt = system_prompt.into();
        let state = SessionState::new(system_prompt.clone());
        let publisher = SessionPublisher::new(&state);
        Self {
            runtime: Arc::new(SessionRuntime {
                backend,
                executor,
                system_prompt,
                max_tool_turns,
            }),
            prompt: String::new(),
            supervisor: SessionSupervisor::new(state, publisher.clone()),
            publisher,
            event_tx: None,
        }
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn system_prompt(&self) -> &str {
        &self.runtime.system_prompt
    }

    /// 以当前 prompt 发起一次生成；旧任务先被取消并等待退出。
    /// prompt 去空白后为空时不启动任务，返回 false。
    pub async fn generate(&mut self) -> bool {
        self.supervisor.cancel().await;

        let input = self.prompt.trim().to_string();
        if input.is_empty() {
            return false;
        }
        self.prompt.clear();
        self.publisher.set_error(None);
        tracing::info!(chars = input.chars().count(), "generation started");

        let runtime = Arc::clone(&self.runtime);
        let publisher = self.publisher.clone();
        let event_tx = self.event_tx.clone();
        self.supervisor
            .start(
                |state| state.begin_generation(&input),
                move |mut state, cancel_token| async move {
                    let ctx = TurnContext::new(
                        runtime.backend.as_ref(),
                        &runtime.executor,
                        &publisher,
                        cancel_token,
                        runtime.max_tool_turns,
                    )
                    .with_event_tx(event_tx.as_ref());

                    let outcome = match run_generation(&ctx, &mut state).await {
                        Ok(outcome) => Ok(outcome),
                        Err(e) => {
                            tracing::warn!(error = %e, "generation failed");
                            let text = e.to_string();
                            ctx.publisher.set_error(Some(text.clone()));
                            if let Some(tx) = ctx.event_tx {
                                let _ = tx.send(ReactEvent::Error { text: text.clone() });
                            }
                            Err(text)
                        }
                    };
                    (state, outcome)
                },
            )
            .await;
        true
    }

    /// 取消当前生成并等待任务退出
    pub async fn cancel(&mut self) -> Option<Result<TurnOutcome, String>> {
        self.supervisor.cancel().await
    }

    /// 等待当前生成自然结束
    pub async fn wait(&mut self) -> Option<Result<TurnOutcome, String>> {
        self.supervisor.wait().await
    }

    /// 按选项清理；任意选项都会清掉 error_message。清理对话会先取消进行中的生成。
    pub async fn clear(&mut self, options: ClearOptions) {
        if options.prompt {
            self.prompt.clear();
        }
        if options.chat {
            let state = self.supervisor.reclaim().await;
            state.reset(&self.runtime.system_prompt);
            self.publisher.publish_transcript(state);
        }
        if options.meta {
            self.publisher.clear_completion();
        }
        self.publisher.set_error(None);
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.publisher.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.publisher.snapshot()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.publisher.snapshot().messages
    }

    pub fn is_generating(&self) -> bool {
        self.publisher.snapshot().is_generating
    }

    pub fn tokens_per_second(&self) -> f64 {
        self.publisher.snapshot().tokens_per_second()
    }

    pub fn error_message(&self) -> Option<String> {
        self.publisher.snapshot().error_message
    }

    /// 后端模型加载进度（0.0 ~ 1.0）；后端不上报时为 None
    pub fn model_download_progress(&self) -> Option<f64> {
        self.runtime
            .backend
            .load_progress()
            .map(|p| p.fraction())
    }
}
