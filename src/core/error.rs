//! 编排运行时错误类型
//!
//! 按处置方式分三类：启动期致命（配置 / 注册）、可恢复（工具调用相关，作为工具结果写回对话）、
//! 会话级致命（持久化失败、取消）。`is_recoverable` 供 GroupCoordinator 判断是否吞下错误继续对话。

use thiserror::Error;

/// 会话编排过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 缺少必需的端点 / 凭据等配置
    #[error("Config error: {0}")]
    ConfigError(String),

    /// 角色或工具注册重复 / 不完整
    #[error("Registration error: {0}")]
    RegistrationError(String),

    #[error("Duplicate tool: {role}.{tool}")]
    DuplicateTool { role: String, tool: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// 工具本身执行失败，message 为工具返回的原始错误
    #[error("Tool execution failed ({tool}): {message}")]
    ToolExecutionFailed { tool: String, message: String },

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 模型输出中的 JSON 无法解析
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Unexpected message for {agent}: {message}")]
    UnexpectedMessage { agent: String, message: String },

    #[error("LLM error: {0}")]
    LlmError(String),

    /// 上下文存储不可达 / 读写失败；对该会话是致命的
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Runtime not running: {0}")]
    RuntimeNotRunning(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Session manager is shut down")]
    ShutDown,
}

impl AgentError {
    /// 工具调用类错误：作为失败的工具结果写回对话，而不是中断会话
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AgentError::ToolNotFound(_)
                | AgentError::InvalidArguments { .. }
                | AgentError::ToolExecutionFailed { .. }
                | AgentError::ToolTimeout(_)
                | AgentError::JsonParseError(_)
        )
    }

    /// 会话级致命：持久化失败时会话状态不能悄悄丢失，必须关闭会话
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, AgentError::PersistenceError(_))
    }
}
