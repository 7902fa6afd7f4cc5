//! Hive - 会话级多智能体编排运行时
//!
//! 模块划分：
//! - **agents**: Agent 地址与目录、固定角色表、会话运行时、协调者 / 规划器 / 能力角色
//! - **capabilities**: 各能力角色的工具类别（solution_architect、diagram_developer、verification_assistant）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、会话监管（取消作用域）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 消息模型与会话上下文存储（进程内 / SQLite）
//! - **safety**: 安全闸（输入进入 Agent 之前的失败即拒绝检查）
//! - **session**: 会话注册表与懒启动
//! - **tools**: 工具 trait、工具类别、分发器与工具目录

pub mod agents;
pub mod capabilities;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod safety;
pub mod session;
pub mod tools;

pub use crate::core::AgentError;
pub use session::{SessionHandle, SessionManager, SessionManagerBuilder};
