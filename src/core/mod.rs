//! 核心层：错误、会话状态与快照、会话监管、会话门面与构建器

pub mod builder;
pub mod error;
pub mod session;
pub mod session_supervisor;
pub mod state;

pub use builder::{create_backend_from_config, SessionBuilder, DEFAULT_SYSTEM_PROMPT};
pub use error::AgentError;
pub use session::{ChatSession, ClearOptions};
pub use session_supervisor::{SessionSupervisor, TaskOutput};
pub use state::{SessionPublisher, SessionSnapshot, SessionState, CANCELLED_MARKER};
