//! 会话构建器：按配置组装后端、职位检索工具与会话
//!
//! REPL 与测试共用同一条装配路径；测试可注入 Mock 后端与离线的工具实现。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::{AgentError, ChatSession};
use crate::jobs::JobBoard;
use crate::llm::{GenerationBackend, MockBackend, OpenAiBackend};
use crate::tools::{JobSearchTool, Tool, ToolExecutor};

/// 内置系统提示词
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a job search assistant for dev.bg, \
the Bulgarian IT job board. When the user asks for jobs, determine the job category \
(for example \"Python\", \"Java\", \"Data Science\", \"DevOps\") and the date \
(\"today\", \"yesterday\" or YYYY-MM-DD). Once both are known, call the \
get_todays_jobs tool; if the date is not mentioned, use \"today\". If the category \
is missing or unclear, ask the user for it instead of guessing. When you call the \
tool, reply with only the <tool_call> block and nothing else. After receiving the \
tool result, present the jobs to the user as a concise markdown list with title, \
company and link.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    OpenAi,
    Mock,
}

/// 显式 provider 优先；未设置（或无法识别）时有 API Key 走 OpenAI，否则 Mock
pub fn select_backend(provider: Option<&str>, has_key: bool) -> BackendKind {
    let detected = if has_key {
        BackendKind::OpenAi
    } else {
        BackendKind::Mock
    };
    match provider.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) if p.eq_ignore_ascii_case("openai") => BackendKind::OpenAi,
        Some(p) if p.eq_ignore_ascii_case("mock") => BackendKind::Mock,
        Some(p) => {
            tracing::warn!(provider = %p, "unknown llm provider, choosing by OPENAI_API_KEY");
            detected
        }
        None => detected,
    }
}

/// 按 [llm] 段创建生成后端
pub fn create_backend_from_config(config: &AppConfig) -> Arc<dyn GenerationBackend> {
    let llm = &config.llm;
    let has_key = std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.trim().is_empty());
    match select_backend(llm.provider.as_deref(), has_key) {
        BackendKind::OpenAi => {
            tracing::info!(model = %llm.model, base_url = ?llm.base_url, "using OpenAI-compatible backend");
            Arc::new(OpenAiBackend::new(
                llm.base_url.as_deref(),
                &llm.model,
                None,
                llm.temperature,
            ))
        }
        BackendKind::Mock => {
            tracing::info!("using mock backend");
            Arc::new(MockBackend::new())
        }
    }
}

/// 翻页总时限：工具超时的九成
pub fn lookup_deadline(tool_timeout_secs: u64) -> Duration {
    Duration::from_secs(tool_timeout_secs) * 9 / 10
}

/// 会话构建器
pub struct SessionBuilder {
    config: AppConfig,
    backend: Option<Arc<dyn GenerationBackend>>,
    tool: Option<Arc<dyn Tool>>,
    system_prompt: Option<String>,
}

impl SessionBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            backend: None,
            tool: None,
            system_prompt: None,
        }
    }

    /// 指定生成后端（默认按配置选择）
    pub fn with_backend(mut self, backend: Arc<dyn GenerationBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// 指定会话唯一的工具（默认 dev.bg 职位检索）
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tool = Some(tool);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn build(self) -> Result<ChatSession, AgentError> {
        let backend = match self.backend {
            Some(backend) => backend,
            None => create_backend_from_config(&self.config),
        };
        let tool = match self.tool {
            Some(tool) => tool,
            None => {
                let board = JobBoard::from_config(&self.config.tools.job_search)
                    .map_err(|e| AgentError::ConfigError(e.to_string()))?
                    .with_deadline(lookup_deadline(self.config.tools.tool_timeout_secs));
                Arc::new(JobSearchTool::new(board))
            }
        };
        let system_prompt = self
            .system_prompt
            .or_else(|| self.config.app.system_prompt.clone())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(ChatSession::new(
            backend,
            ToolExecutor::new(tool, self.config.tools.tool_timeout_secs),
            system_prompt,
            self.config.session.max_tool_turns,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Role;

    #[test]
    fn test_default_prompt_mentions_tool() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("get_todays_jobs"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("<tool_call>"));
    }

    #[test]
    fn test_explicit_provider_wins_over_key() {
        assert_eq!(select_backend(Some("mock"), true), BackendKind::Mock);
        assert_eq!(select_backend(Some("OpenAI"), false), BackendKind::OpenAi);
        assert_eq!(select_backend(None, true), BackendKind::OpenAi);
        assert_eq!(select_backend(None, false), BackendKind::Mock);
        assert_eq!(select_backend(Some("  "), true), BackendKind::OpenAi);
        assert_eq!(select_backend(Some("llama"), false), BackendKind::Mock);
    }

    #[test]
    fn test_lookup_deadline_is_inside_tool_timeout() {
        assert_eq!(lookup_deadline(60), Duration::from_secs(54));
        assert!(lookup_deadline(1) < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_build_with_overrides() {
        let session = SessionBuilder::new(AppConfig::default())
            .with_backend(Arc::new(MockBackend::new()))
            .with_system_prompt("be brief")
            .build()
            .unwrap();
        let messages = session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role(), Role::System);
        assert_eq!(messages[0].content(), "be brief");
        assert_eq!(session.model_download_progress(), None);
    }
}
