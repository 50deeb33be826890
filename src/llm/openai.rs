//! OpenAI 兼容流式后端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url，如本地 llama.cpp / vLLM / Ollama）。
//! 工具描述符与调用协议拼入 system 消息，tool 消息以 user 身份回传；
//! 文本流经 ToolCallDetector 转为生成事件。丢弃流即断开 HTTP 连接、中止推理。

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::StreamExt;

use crate::llm::tool_call::text_event_stream;
use crate::llm::{GenerationBackend, GenerationStream, LlmError};
use crate::memory::{Message, Role};
use crate::tools::{tool_prompt_section, ToolSpec};

/// 粗略估计：约 4 个字符一个 token
const CHARS_PER_TOKEN: usize = 4;

pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiBackend {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>, temperature: f32) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            temperature,
        }
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let tool_section = tool_prompt_section(tools);
        let build_err = |e: async_openai::error::OpenAIError| LlmError::ApiError(e.to_string());

        messages
            .iter()
            // 流式生成前追加的空占位不发给后端
            .filter(|m| !m.is_placeholder())
            .map(|m| -> Result<ChatCompletionRequestMessage, LlmError> {
                let msg = match m.role() {
                    Role::System => {
                        let content = if tool_section.is_empty() {
                            m.content().to_string()
                        } else {
                            format!("{}\n\n{}", m.content(), tool_section)
                        };
                        ChatCompletionRequestMessage::System(
                            ChatCompletionRequestSystemMessageArgs::default()
                                .content(content)
                                .build()
                                .map_err(build_err)?,
                        )
                    }
                    Role::User => ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(m.content().to_string())
                            .build()
                            .map_err(build_err)?,
                    ),
                    Role::Tool => ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(format!("Tool result:\n{}", m.content()))
                            .build()
                            .map_err(build_err)?,
                    ),
                    Role::Assistant => ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(m.content().to_string())
                            .build()
                            .map_err(build_err)?,
                    ),
                };
                Ok(msg)
            })
            .collect()
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    async fn open(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<GenerationStream, LlmError> {
        let prompt_chars: usize = messages.iter().map(|m| m.content().chars().count()).sum();
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(self.to_openai_messages(messages, tools)?)
            .build()
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        tracing::debug!(model = %self.model, messages = messages.len(), "opening completion stream");
        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        let chunks = stream.map(|item| match item {
            Ok(resp) => Ok(resp
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect::<String>()),
            Err(e) => Err(LlmError::Stream(e.to_string())),
        });

        Ok(Box::pin(text_event_stream(chunks, prompt_chars / CHARS_PER_TOKEN)))
    }
}
