//! 会话内 Agent 之间传递的消息

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agents::roles::AgentRole;

/// 一次工具调用请求：{"tool": "...", "args": {...}}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default = "empty_args")]
    pub args: Value,
}

fn empty_args() -> Value {
    Value::Object(Default::default())
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// 工具调用结果；失败也是结果（success = false，content 为错误描述）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub tool: String,
    pub content: String,
    pub success: bool,
}

/// 规划器的决定
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerDecision {
    /// 直接回复用户
    Respond(String),
    /// 把一步交给某个能力角色；call 为空时由该角色自行选择工具
    Delegate {
        role: AgentRole,
        instruction: String,
        call: Option<ToolCall>,
    },
}

#[derive(Debug, Clone)]
pub enum AgentMessage {
    /// 用户输入（发往协调者与人类代理）
    UserInput { text: String },
    /// 请规划器决定下一步
    Plan,
    /// 交给能力角色的一步
    Task {
        instruction: String,
        call: Option<ToolCall>,
    },
    /// 交给工具分发 Agent
    ToolCall(ToolCall),
}

impl AgentMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentMessage::UserInput { .. } => "user_input",
            AgentMessage::Plan => "plan",
            AgentMessage::Task { .. } => "task",
            AgentMessage::ToolCall(_) => "tool_call",
        }
    }
}

#[derive(Debug, Clone)]
pub enum AgentReply {
    Ack,
    Decision(PlannerDecision),
    ToolResult(ToolResult),
    Text(String),
    Turn(TurnOutcome),
}

/// 一轮对话的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// 安全闸拒绝，输入未进入任何 Agent
    Declined { reason: String },
    /// 文本回复（来自规划器或能力角色）
    Response { source: String, text: String },
    /// 能力角色执行了工具
    ToolResult { source: String, result: ToolResult },
}
