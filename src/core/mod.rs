//! 核心层：错误类型与会话取消作用域

pub mod error;
pub mod session_supervisor;

pub use error::AgentError;
pub use session_supervisor::SessionSupervisor;
