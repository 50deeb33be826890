//! 工具层：工具契约、执行器（超时 + 审计）、调用协议 Schema、dev.bg 职位检索工具

pub mod executor;
pub mod job_search;
pub mod schema;
pub mod tool;

pub use executor::ToolExecutor;
pub use job_search::{JobSearchTool, JOB_SEARCH_TOOL_NAME};
pub use schema::{tool_call_schema_json, tool_prompt_section, TOOL_CALL_CLOSE, TOOL_CALL_OPEN};
pub use tool::{Tool, ToolError, ToolOutput, ToolSpec};
