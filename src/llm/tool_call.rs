//! 文本协议中的工具调用检测
//!
//! 模型以 `<tool_call>{"name": ..., "arguments": {...}}</tool_call>` 请求工具。
//! ToolCallDetector 增量处理流式文本：普通文本原样放行，可能是起始标签前缀的尾部先暂存，
//! 捕获到完整块后解析为 ToolCall。块内 JSON 非法或到流末尾仍未闭合时，原文作为普通文本放行。

use std::collections::VecDeque;
use std::time::Instant;

use futures_util::{stream, Stream, StreamExt};
use serde_json::Value;

use crate::llm::{CompletionInfo, GenerationEvent, LlmError, ToolCallRequest};
use crate::tools::{TOOL_CALL_CLOSE, TOOL_CALL_OPEN};

#[derive(Debug, Default)]
pub struct ToolCallDetector {
    buffer: String,
    capturing: bool,
    done: bool,
}

impl ToolCallDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已检测到工具调用；之后的输入全部忽略
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push(&mut self, chunk: &str) -> Vec<GenerationEvent> {
        let mut out = Vec::new();
        if self.done {
            return out;
        }
        self.buffer.push_str(chunk);

        loop {
            if !self.capturing {
                if let Some(idx) = self.buffer.find(TOOL_CALL_OPEN) {
                    if idx > 0 {
                        out.push(GenerationEvent::TextDelta(self.buffer[..idx].to_string()));
                    }
                    self.buffer.drain(..idx + TOOL_CALL_OPEN.len());
                    self.capturing = true;
                    continue;
                }
                let emit_to = self.buffer.len() - partial_open_len(&self.buffer);
                if emit_to > 0 {
                    out.push(GenerationEvent::TextDelta(self.buffer[..emit_to].to_string()));
                    self.buffer.drain(..emit_to);
                }
                return out;
            }

            let Some(idx) = self.buffer.find(TOOL_CALL_CLOSE) else {
                return out;
            };
            let body = self.buffer[..idx].to_string();
            self.buffer.drain(..idx + TOOL_CALL_CLOSE.len());
            self.capturing = false;
            match parse_tool_call(&body) {
                Some(call) => {
                    out.push(GenerationEvent::ToolCall(call));
                    self.done = true;
                    self.buffer.clear();
                    return out;
                }
                None => {
                    tracing::warn!(body = %body, "malformed tool call block, passing through as text");
                    out.push(GenerationEvent::TextDelta(format!(
                        "{TOOL_CALL_OPEN}{body}{TOOL_CALL_CLOSE}"
                    )));
                }
            }
        }
    }

    /// 流结束：释放暂存内容；未闭合的块若能解析仍视为工具调用
    pub fn finish(&mut self) -> Vec<GenerationEvent> {
        if self.done {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.buffer);
        if self.capturing {
            self.capturing = false;
            if let Some(call) = parse_tool_call(&rest) {
                self.done = true;
                return vec![GenerationEvent::ToolCall(call)];
            }
            return vec![GenerationEvent::TextDelta(format!("{TOOL_CALL_OPEN}{rest}"))];
        }
        if rest.is_empty() {
            Vec::new()
        } else {
            vec![GenerationEvent::TextDelta(rest)]
        }
    }
}

/// buffer 尾部与起始标签前缀重合的最大长度（标签为 ASCII，截断点必在字符边界）
fn partial_open_len(buffer: &str) -> usize {
    (1..TOOL_CALL_OPEN.len())
        .rev()
        .find(|&k| buffer.ends_with(&TOOL_CALL_OPEN[..k]))
        .unwrap_or(0)
}

/// 解析块体；arguments 可为对象或 JSON 字符串
pub fn parse_tool_call(body: &str) -> Option<ToolCallRequest> {
    let value: Value = serde_json::from_str(body.trim()).ok()?;
    let name = value.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let arguments = match value.get("arguments") {
        Some(Value::String(raw)) => serde_json::from_str(raw).ok()?,
        Some(v) if !v.is_null() => v.clone(),
        _ => Value::Object(Default::default()),
    };
    Some(ToolCallRequest {
        name: name.to_string(),
        arguments,
    })
}

struct DetectState<S> {
    inner: S,
    detector: ToolCallDetector,
    pending: VecDeque<Result<GenerationEvent, LlmError>>,
    finished: bool,
    prompt_tokens: usize,
    opened_at: Instant,
    first_chunk_at: Option<Instant>,
    chunks: usize,
}

impl<S> DetectState<S> {
    fn completion_info(&self) -> CompletionInfo {
        let now = Instant::now();
        let first = self.first_chunk_at.unwrap_or(now);
        CompletionInfo {
            prompt_tokens: self.prompt_tokens,
            generation_tokens: self.chunks,
            prompt_time: first.duration_since(self.opened_at),
            generate_time: now.duration_since(first),
        }
    }
}

/// 将原始文本块流转为生成事件流：检测工具调用，并在流末尾追加 CompletionInfo
///
/// 每个非空文本块计为一个生成 token；首块到达前的耗时计为 prompt_time。
pub fn text_event_stream<S>(
    inner: S,
    prompt_tokens: usize,
) -> impl Stream<Item = Result<GenerationEvent, LlmError>> + Send
where
    S: Stream<Item = Result<String, LlmError>> + Send + Unpin,
{
    let state = DetectState {
        inner,
        detector: ToolCallDetector::new(),
        pending: VecDeque::new(),
        finished: false,
        prompt_tokens,
        opened_at: Instant::now(),
        first_chunk_at: None,
        chunks: 0,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(ev) = st.pending.pop_front() {
                return Some((ev, st));
            }
            if st.finished {
                return None;
            }
            match st.inner.next().await {
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    st.first_chunk_at.get_or_insert_with(Instant::now);
                    st.chunks += 1;
                    let events = st.detector.push(&chunk);
                    st.pending.extend(events.into_iter().map(Ok));
                }
                Some(Err(e)) => {
                    st.pending.push_back(Err(e));
                    st.finished = true;
                }
                None => {
                    let events = st.detector.finish();
                    st.pending.extend(events.into_iter().map(Ok));
                    let info = st.completion_info();
                    st.pending.push_back(Ok(GenerationEvent::CompletionInfo(info)));
                    st.finished = true;
                }
            }
        }
    })
}
