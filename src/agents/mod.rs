//! 会话内的 Agent：地址与目录、角色表、运行时，以及各角色实现

pub mod address;
pub mod capability;
pub mod coordinator;
pub mod dispatch;
pub mod human;
pub mod message;
pub mod planner;
pub mod roles;
pub mod runtime;

pub use address::{AgentAddress, AgentDirectory, DirectoryEntry, COORDINATOR_NAME};
pub use capability::CapabilityAgent;
pub use coordinator::GroupCoordinator;
pub use dispatch::ToolDispatchAgent;
pub use human::HumanAgent;
pub use message::{AgentMessage, AgentReply, PlannerDecision, ToolCall, ToolResult, TurnOutcome};
pub use planner::{parse_planner_output, PlannerAgent};
pub use roles::{AgentRole, RoleSpec, ROLE_TABLE};
pub use runtime::{Agent, AgentConstructor, AgentDeps, SessionRuntime};
