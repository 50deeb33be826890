//! jobscout - 对话式职位检索智能体运行时
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、会话状态与快照、会话监管、会话门面与构建器
//! - **jobs**: dev.bg 职位检索（分类映射、日期解析、列表抓取与渲染）
//! - **llm**: 生成后端抽象与实现（OpenAI 兼容流式 / Mock）、工具调用协议解析
//! - **memory**: 对话记录
//! - **react**: 生成编排主循环与过程事件
//! - **tools**: 工具契约、执行器与职位检索工具

pub mod config;
pub mod core;
pub mod jobs;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use crate::core::{ChatSession, ClearOptions, SessionBuilder};
