//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `JOBSCOUT__*` 覆盖（双下划线表示嵌套，如 `JOBSCOUT__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub session: SessionSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名与系统提示词覆盖
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 未设置时使用内置的求职助手提示词
    pub system_prompt: Option<String>,
}

/// [session] 段
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// 单次生成允许的工具调用次数
    #[serde(default = "default_max_tool_turns")]
    pub max_tool_turns: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_tool_turns: default_max_tool_turns(),
        }
    }
}

fn default_max_tool_turns() -> usize {
    2
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / mock；未设置时按 OPENAI_API_KEY 是否存在选择
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// OpenAI 兼容端点（本地 llama.cpp / vLLM / Ollama 等）
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: None,
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

/// [tools] 段：工具超时与职位检索
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub job_search: JobSearchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            job_search: JobSearchSection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    60
}

/// [tools.job_search] 段：招聘站地址、翻页上限、请求超时与 UA
#[derive(Debug, Clone, Deserialize)]
pub struct JobSearchSection {
    #[serde(default = "default_job_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_job_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for JobSearchSection {
    fn default() -> Self {
        Self {
            base_url: default_job_base_url(),
            max_pages: default_max_pages(),
            timeout_secs: default_job_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_job_base_url() -> String {
    "https://dev.bg".to_string()
}

fn default_max_pages() -> u32 {
    15
}

fn default_job_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 \
     (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1"
        .to_string()
}

/// 从 config 目录加载配置，环境变量 JOBSCOUT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 JOBSCOUT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("JOBSCOUT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
