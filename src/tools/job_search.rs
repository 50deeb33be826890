//! get_todays_jobs：检索 dev.bg 某分类在指定日期发布的职位
//!
//! 参数：category（必填，trim 后非空）、date（可选，缺省或空串为 "today"）。
//! 只有「无法构造请求」或「底层检索出错」才返回 Err；参数问题降级为描述性文本，保持对话继续。

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::jobs::JobBoard;
use crate::tools::{Tool, ToolError, ToolOutput};

pub const JOB_SEARCH_TOOL_NAME: &str = "get_todays_jobs";
const DEFAULT_DATE: &str = "today";

#[derive(Debug, Deserialize)]
struct JobSearchInput {
    #[serde(default)]
    category: String,
    #[serde(default)]
    date: Option<String>,
}

pub struct JobSearchTool {
    board: JobBoard,
}

impl JobSearchTool {
    pub fn new(board: JobBoard) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Tool for JobSearchTool {
    fn name(&self) -> &str {
        JOB_SEARCH_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Get jobs posted today or on a given date in a specific category from dev.bg"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "description": "The job category (e.g., 'Data Science', 'Software Development', 'DevOps')."
                },
                "date": {
                    "type": "string",
                    "description": "The date to search (e.g., 'today', 'yesterday', '2024-06-15'). Defaults to 'today'."
                }
            },
            "required": ["category"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let input: JobSearchInput = match serde_json::from_value(args) {
            Ok(input) => input,
            Err(e) => {
                return Ok(ToolOutput::new(format!(
                    "Invalid arguments for {JOB_SEARCH_TOOL_NAME}: {e}. \
                     Expected {{\"category\": string, \"date\": string (optional)}}."
                )))
            }
        };
        let date = requested_date(input.date.as_deref());
        tracing::info!(category = %input.category, date = %date, "job search");
        let text = self.board.search(&input.category, date).await?;
        Ok(ToolOutput::new(text))
    }
}

/// 缺省或空白日期按 "today" 处理
fn requested_date(date: Option<&str>) -> &str {
    date.map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(DEFAULT_DATE)
}
