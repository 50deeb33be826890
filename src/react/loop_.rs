//! 生成编排主循环
//!
//! 打开事件流 -> 逐个消费（文本增量 / 完成指标 / 工具调用）-> 工具调用时执行工具、回灌结果、
//! 以更新后的对话重新打开流；直到流自然结束、超出工具轮数、被取消或出错。
//! 三个挂起点（打开流、每次取事件、工具执行）都与取消令牌竞争。

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, SessionPublisher, SessionState};
use crate::llm::{GenerationBackend, GenerationEvent, ToolCallRequest};
use crate::react::ReactEvent;
use crate::tools::{ToolExecutor, ToolSpec};

/// 超出工具轮数时追加的 assistant 消息
pub const TOOL_LIMIT_MESSAGE: &str = "Tool call limit reached.";
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 一次生成的结束方式（失败经 Err 返回）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed,
    ToolLimitReached,
    Cancelled,
}

/// 单次生成的编排上下文
pub struct TurnContext<'a> {
    /// 生成后端（必需）
    pub backend: &'a dyn GenerationBackend,
    /// 工具执行器（必需）
    pub executor: &'a ToolExecutor,
    /// 快照发布端（必需）
    pub publisher: &'a SessionPublisher,
    /// 取消令牌（必需）
    pub cancel_token: CancellationToken,
    /// 单次生成允许的工具调用次数
    pub max_tool_turns: usize,
    /// 可选：事件推送通道
    pub event_tx: Option<&'a UnboundedSender<ReactEvent>>,
}

impl<'a> TurnContext<'a> {
    pub fn new(
        backend: &'a dyn GenerationBackend,
        executor: &'a ToolExecutor,
        publisher: &'a SessionPublisher,
        cancel_token: CancellationToken,
        max_tool_turns: usize,
    ) -> Self {
        Self {
            backend,
            executor,
            publisher,
            cancel_token,
            max_tool_turns,
            event_tx: None,
        }
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: Option<&'a UnboundedSender<ReactEvent>>) -> Self {
        self.event_tx = tx;
        self
    }

    fn emit(&self, event: ReactEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }
}

/// 单轮流的结束方式
enum StreamEnd {
    Finished,
    ToolCall(ToolCallRequest),
    Cancelled,
}

/// 运行一次生成（调用方已追加 user 消息与空占位）
pub async fn run_generation(
    ctx: &TurnContext<'_>,
    state: &mut SessionState,
) -> Result<TurnOutcome, AgentError> {
    let tools = [ctx.executor.spec()];
    let mut turn = 0;

    loop {
        turn += 1;
        ctx.emit(ReactEvent::TurnStarted { turn });

        match stream_turn(ctx, state, &tools).await? {
            StreamEnd::Finished => {
                ctx.emit(ReactEvent::Done);
                return Ok(TurnOutcome::Completed);
            }
            StreamEnd::Cancelled => return Ok(finish_cancelled(ctx, state)),
            StreamEnd::ToolCall(request) => {
                if let Some(outcome) = handle_tool_call(ctx, state, request).await? {
                    return Ok(outcome);
                }
            }
        }
    }
}

/// 打开并消费一轮事件流；返回时流被丢弃，后端随之停止推理
async fn stream_turn(
    ctx: &TurnContext<'_>,
    state: &mut SessionState,
    tools: &[ToolSpec],
) -> Result<StreamEnd, AgentError> {
    let mut stream = tokio::select! {
        biased;
        _ = ctx.cancel_token.cancelled() => return Ok(StreamEnd::Cancelled),
        opened = ctx.backend.open(state.transcript().messages(), tools) => opened?,
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel_token.cancelled() => return Ok(StreamEnd::Cancelled),
            next = stream.next() => next,
        };

        match next {
            None => return Ok(StreamEnd::Finished),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(GenerationEvent::TextDelta(text))) => {
                state.apply_delta(&text);
                ctx.publisher.publish_transcript(state);
                ctx.emit(ReactEvent::TextDelta { text });
            }
            Some(Ok(GenerationEvent::CompletionInfo(info))) => {
                ctx.publisher.record_completion(info);
                ctx.emit(ReactEvent::Completion {
                    tokens_per_second: info.tokens_per_second(),
                });
            }
            Some(Ok(GenerationEvent::ToolCall(request))) => {
                return Ok(StreamEnd::ToolCall(request));
            }
        }
    }
}

/// 处理一次工具调用；返回 Some 表示本次生成到此结束
async fn handle_tool_call(
    ctx: &TurnContext<'_>,
    state: &mut SessionState,
    request: ToolCallRequest,
) -> Result<Option<TurnOutcome>, AgentError> {
    if state.register_tool_turn() > ctx.max_tool_turns {
        tracing::info!(limit = ctx.max_tool_turns, tool = %request.name, "tool call limit reached");
        state.push_assistant(TOOL_LIMIT_MESSAGE);
        ctx.publisher.publish_transcript(state);
        ctx.emit(ReactEvent::ToolLimitReached {
            limit: ctx.max_tool_turns,
        });
        return Ok(Some(TurnOutcome::ToolLimitReached));
    }

    if state.remove_placeholder() {
        ctx.publisher.publish_transcript(state);
    }
    if ctx.cancel_token.is_cancelled() {
        return Ok(Some(finish_cancelled(ctx, state)));
    }

    ctx.emit(ReactEvent::ToolCall {
        tool: request.name.clone(),
        args: request.arguments.clone(),
    });
    tracing::debug!(tool = %request.name, "executing tool call");

    let call = ctx.executor.execute(&request);
    tokio::pin!(call);
    let result = tokio::select! {
        biased;
        _ = ctx.cancel_token.cancelled() => {
            // 已发出的工具调用跑完为止，结果丢弃
            let outcome = finish_cancelled(ctx, state);
            let _ = (&mut call).await;
            return Ok(Some(outcome));
        }
        result = &mut call => result,
    };
    if ctx.cancel_token.is_cancelled() {
        return Ok(Some(finish_cancelled(ctx, state)));
    }

    let output = result?;
    state.push_tool_result(&output.tool_result);
    ctx.publisher.publish_transcript(state);
    ctx.emit(ReactEvent::Observation {
        tool: request.name.clone(),
        preview: output
            .tool_result
            .chars()
            .take(OBSERVATION_PREVIEW_CHARS)
            .collect(),
    });
    Ok(None)
}

fn finish_cancelled(ctx: &TurnContext<'_>, state: &mut SessionState) -> TurnOutcome {
    if state.mark_cancelled() {
        ctx.publisher.publish_transcript(state);
    }
    tracing::info!("generation cancelled");
    ctx.emit(ReactEvent::Cancelled);
    TurnOutcome::Cancelled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockBackend, ScriptStep};
    use crate::memory::Role;
    use crate::tools::{Tool, ToolError, ToolOutput};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct LookupTool {
        started: AtomicUsize,
        finished: AtomicUsize,
        delay: Option<Duration>,
        fail: bool,
        notify: Notify,
    }

    #[async_trait]
    impl Tool for LookupTool {
        fn name(&self) -> &str {
            "lookup"
        }

        fn description(&self) -> &str {
            "looks things up"
        }

        async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ToolError::Failed("backend down".into()));
            }
            Ok(ToolOutput::new(format!(
                "result for {}",
                args["q"].as_str().unwrap_or("?")
            )))
        }
    }

    struct Harness {
        backend: MockBackend,
        tool: Arc<LookupTool>,
        executor: ToolExecutor,
        publisher: SessionPublisher,
        state: SessionState,
        token: CancellationToken,
    }

    impl Harness {
        fn new(backend: MockBackend, tool: LookupTool) -> Self {
            let tool = Arc::new(tool);
            let mut state = SessionState::new("sys");
            state.begin_generation("question");
            Self {
                backend,
                executor: ToolExecutor::new(tool.clone(), 5),
                tool,
                publisher: SessionPublisher::new(&state),
                state,
                token: CancellationToken::new(),
            }
        }

        async fn run(&mut self, max_tool_turns: usize) -> Result<TurnOutcome, AgentError> {
            let ctx = TurnContext::new(
                &self.backend,
                &self.executor,
                &self.publisher,
                self.token.clone(),
                max_tool_turns,
            );
            run_generation(&ctx, &mut self.state).await
        }

        fn contents(&self) -> Vec<(Role, String)> {
            self.state
                .transcript()
                .messages()
                .iter()
                .map(|m| (m.role(), m.content().to_string()))
                .collect()
        }
    }

    #[tokio::test]
    async fn test_deltas_are_concatenated() {
        let backend = MockBackend::new().with_script(vec![
            ScriptStep::text("Hel"),
            ScriptStep::text("lo"),
            ScriptStep::info(4, Duration::from_secs(2)),
        ]);
        let mut h = Harness::new(backend, LookupTool::default());
        assert_eq!(h.run(2).await.unwrap(), TurnOutcome::Completed);
        assert_eq!(h.state.transcript().last().map(|m| m.content()), Some("Hello"));
        assert_eq!(h.publisher.snapshot().tokens_per_second(), 2.0);
        assert_eq!(h.publisher.snapshot().messages.len(), 3);
    }

    #[tokio::test]
    async fn test_tool_round_trip() {
        let backend = MockBackend::new()
            .with_script(vec![ScriptStep::tool_call("lookup", json!({"q": "rust"}))])
            .with_script(vec![ScriptStep::text("Here you go")]);
        let mut h = Harness::new(backend, LookupTool::default());
        assert_eq!(h.run(2).await.unwrap(), TurnOutcome::Completed);
        assert_eq!(
            h.contents(),
            vec![
                (Role::System, "sys".into()),
                (Role::User, "question".into()),
                (Role::Tool, "result for rust".into()),
                (Role::Assistant, "Here you go".into()),
            ]
        );
        // 第二轮打开时对话里已有工具结果
        let histories = h.backend.opened_histories();
        assert_eq!(histories.len(), 2);
        assert_eq!(histories[1][2].role(), Role::Tool);
        assert_eq!(h.backend.opened_tools()[0][0].name, "lookup");
    }

    #[tokio::test]
    async fn test_text_before_tool_call_is_kept() {
        let backend = MockBackend::new()
            .with_script(vec![
                ScriptStep::text("Let me check"),
                ScriptStep::tool_call("lookup", json!({"q": "go"})),
            ])
            .with_script(vec![ScriptStep::text("Done")]);
        let mut h = Harness::new(backend, LookupTool::default());
        h.run(2).await.unwrap();
        let roles: Vec<Role> = h.contents().into_iter().map(|(r, _)| r).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        assert_eq!(h.contents()[2].1, "Let me check");
    }

    #[tokio::test]
    async fn test_tool_limit() {
        let backend = MockBackend::new()
            .with_script(vec![ScriptStep::tool_call("lookup", json!({"q": "1"}))])
            .with_script(vec![ScriptStep::tool_call("lookup", json!({"q": "2"}))])
            .with_script(vec![ScriptStep::tool_call("lookup", json!({"q": "3"}))]);
        let mut h = Harness::new(backend, LookupTool::default());
        assert_eq!(h.run(2).await.unwrap(), TurnOutcome::ToolLimitReached);
        assert_eq!(h.tool.started.load(Ordering::SeqCst), 2);
        assert_eq!(
            h.state.transcript().last().map(|m| m.content()),
            Some(TOOL_LIMIT_MESSAGE)
        );
        assert_eq!(h.state.tool_turns(), 3);
    }

    #[tokio::test]
    async fn test_tool_failure_appends_nothing() {
        let backend = MockBackend::new()
            .with_script(vec![ScriptStep::tool_call("lookup", json!({"q": "x"}))]);
        let tool = LookupTool {
            fail: true,
            ..LookupTool::default()
        };
        let mut h = Harness::new(backend, tool);
        let err = h.run(2).await.unwrap_err();
        assert_eq!(err.to_string(), "Tool execution failed: backend down");
        assert_eq!(h.state.transcript().last().map(|m| m.role()), Some(Role::User));
    }

    #[tokio::test]
    async fn test_hallucinated_tool_fails() {
        let backend = MockBackend::new()
            .with_script(vec![ScriptStep::tool_call("delete_everything", json!({}))]);
        let mut h = Harness::new(backend, LookupTool::default());
        let err = h.run(2).await.unwrap_err();
        assert!(matches!(err, AgentError::HallucinatedTool(ref n) if n == "delete_everything"));
        assert_eq!(h.tool.started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_open_and_stream_errors() {
        let backend = MockBackend::new();
        backend.fail_next_open(LlmError::ModelUnavailable("qwen".into()));
        let mut h = Harness::new(backend, LookupTool::default());
        assert!(matches!(h.run(2).await, Err(AgentError::LlmError(_))));

        let backend = MockBackend::new().with_script(vec![
            ScriptStep::text("par"),
            ScriptStep::Fail(LlmError::Stream("reset".into())),
        ]);
        let mut h = Harness::new(backend, LookupTool::default());
        assert!(h.run(2).await.is_err());
        assert_eq!(h.state.transcript().last().map(|m| m.content()), Some("par"));
    }

    #[tokio::test]
    async fn test_cancel_mid_stream() {
        let backend = MockBackend::new()
            .with_script(vec![ScriptStep::text("partial"), ScriptStep::Hang]);
        let mut h = Harness::new(backend, LookupTool::default());
        let mut rx = h.publisher.subscribe();
        let token = h.token.clone();
        let canceller = async move {
            let _ = rx
                .wait_for(|s| s.messages.last().map(|m| m.content()) == Some("partial"))
                .await;
            token.cancel();
        };
        let (outcome, _) = tokio::join!(h.run(2), canceller);
        assert_eq!(outcome.unwrap(), TurnOutcome::Cancelled);
        assert_eq!(
            h.state.transcript().last().map(|m| m.content()),
            Some("partial\n[Cancelled]")
        );
    }

    #[tokio::test]
    async fn test_cancel_during_tool_discards_result() {
        let backend = MockBackend::new()
            .with_script(vec![ScriptStep::tool_call("lookup", json!({"q": "slow"}))]);
        let tool = LookupTool {
            delay: Some(Duration::from_millis(50)),
            ..LookupTool::default()
        };
        let mut h = Harness::new(backend, tool);
        let tool = h.tool.clone();
        let token = h.token.clone();
        let canceller = async move {
            tool.notify.notified().await;
            token.cancel();
        };
        let (outcome, _) = tokio::join!(h.run(2), canceller);
        assert_eq!(outcome.unwrap(), TurnOutcome::Cancelled);
        assert_eq!(h.tool.finished.load(Ordering::SeqCst), 1);
        assert!(h.contents().iter().all(|(role, _)| *role != Role::Tool));
        let marked = h
            .contents()
            .iter()
            .filter(|(_, c)| c.ends_with("[Cancelled]"))
            .count();
        assert_eq!(marked, 1);
        assert_eq!(h.backend.open_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_before_open() {
        let mut h = Harness::new(MockBackend::new(), LookupTool::default());
        h.token.cancel();
        assert_eq!(h.run(2).await.unwrap(), TurnOutcome::Cancelled);
        assert_eq!(h.backend.open_count(), 0);
        assert_eq!(
            h.state.transcript().last().map(|m| m.content()),
            Some("\n[Cancelled]")
        );
    }

    #[tokio::test]
    async fn test_events_are_emitted() {
        let backend = MockBackend::new()
            .with_script(vec![ScriptStep::tool_call("lookup", json!({"q": "e"}))])
            .with_script(vec![ScriptStep::text("ok")]);
        let mut h = Harness::new(backend, LookupTool::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = TurnContext::new(&h.backend, &h.executor, &h.publisher, h.token.clone(), 2)
            .with_event_tx(Some(&tx));
        run_generation(&ctx, &mut h.state).await.unwrap();
        drop(ctx);
        drop(tx);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert_eq!(events.first(), Some(&ReactEvent::TurnStarted { turn: 1 }));
        assert!(events.contains(&ReactEvent::Observation {
            tool: "lookup".into(),
            preview: "result for e".into()
        }));
        assert_eq!(events.last(), Some(&ReactEvent::Done));
    }
}
