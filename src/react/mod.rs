//! 编排层：生成主循环与过程事件

pub mod events;
pub mod loop_;

pub use events::ReactEvent;
pub use loop_::{run_generation, TurnContext, TurnOutcome, TOOL_LIMIT_MESSAGE};
