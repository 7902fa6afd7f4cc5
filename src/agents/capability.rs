//! 能力角色 Agent
//!
//! 收到 Task 后：若规划器已给出具体调用则直接使用，否则让 LLM 在本角色的工具里选一个。
//! 工具只能经由本角色的工具分发地址调用；结果（含失败）写回会话上下文。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::agents::address::AgentAddress;
use crate::agents::message::{AgentMessage, AgentReply, ToolCall};
use crate::agents::planner::parse_json_reply;
use crate::agents::roles::AgentRole;
use crate::agents::runtime::{Agent, AgentDeps, SessionRuntime};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{Message, SessionContext};
use crate::tools::ToolCategory;

pub struct CapabilityAgent {
    role: AgentRole,
    address: AgentAddress,
    llm: Arc<dyn LlmClient>,
    context: SessionContext,
    tools: Arc<ToolCategory>,
    tool_dispatch: AgentAddress,
    history_window: usize,
    system_prompt: String,
}

/// LLM 选择工具的原始输出
#[derive(Debug, Deserialize)]
struct ToolChoice {
    #[serde(default)]
    tool: String,
    #[serde(default)]
    args: Option<serde_json::Value>,
}

enum Choice {
    Call(ToolCall),
    Reply(String),
}

impl CapabilityAgent {
    pub fn create(deps: AgentDeps) -> Result<Box<dyn Agent>, AgentError> {
        let role = deps.require_role()?;
        let tools = deps.require(&deps.tools, "a tool category")?;
        let tool_dispatch = deps.require(&deps.tool_dispatch, "a tool dispatch address")?;
        if tools.name() != role.name() {
            return Err(AgentError::RegistrationError(format!(
                "tool category {} does not belong to role {}",
                tools.name(),
                role
            )));
        }
        Ok(Box::new(Self {
            role,
            address: deps.address,
            llm: deps.llm,
            context: deps.context,
            tools,
            tool_dispatch,
            history_window: deps.history_window,
            system_prompt: deps.system_prompt,
        }))
    }

    fn tool_prompt(&self) -> String {
        let tools = serde_json::to_string_pretty(&self.tools.descriptors())
            .unwrap_or_else(|_| "[]".to_string());
        format!(
            "{}\n\nAvailable tools:\n{}\n\nTo use a tool reply with JSON only: {{\"tool\": \"<name>\", \"args\": {{...}}}}. \
             If no tool applies, reply in plain text.",
            self.system_prompt, tools
        )
    }

    /// 让 LLM 选择工具，或给出文本回复
    async fn choose(&self, instruction: &str) -> Result<Choice, AgentError> {
        let mut messages = vec![Message::system(self.tool_prompt())];
        messages.extend(self.context.recent(self.history_window).await?);
        messages.push(Message::user(instruction.to_string()));

        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)?;

        let Some(choice) = parse_json_reply::<ToolChoice>(&output)? else {
            return Ok(Choice::Reply(output.trim().to_string()));
        };
        if choice.tool.is_empty() {
            return Ok(Choice::Reply(output.trim().to_string()));
        }
        Ok(Choice::Call(ToolCall::new(
            choice.tool,
            choice.args.unwrap_or_else(|| serde_json::json!({})),
        )))
    }
}

#[async_trait]
impl Agent for CapabilityAgent {
    async fn handle(
        &mut self,
        message: AgentMessage,
        runtime: &SessionRuntime,
    ) -> Result<AgentReply, AgentError> {
        let (instruction, call) = match message {
            AgentMessage::Task { instruction, call } => (instruction, call),
            other => {
                return Err(AgentError::UnexpectedMessage {
                    agent: self.address.to_string(),
                    message: other.kind().to_string(),
                })
            }
        };

        let call = match call {
            Some(call) => call,
            None => match self.choose(&instruction).await? {
                Choice::Call(call) => call,
                Choice::Reply(text) => {
                    self.context
                        .append(Message::assistant(text.clone()).with_source(self.role.name()))
                        .await?;
                    return Ok(AgentReply::Text(text));
                }
            },
        };

        tracing::info!(
            agent = %self.address,
            tool = %call.tool,
            "delegating to tool dispatch"
        );
        match runtime
            .send(&self.tool_dispatch, AgentMessage::ToolCall(call))
            .await?
        {
            AgentReply::ToolResult(result) => {
                self.context
                    .append(Message::tool(result.content.clone()).with_source(self.role.name()))
                    .await?;
                Ok(AgentReply::ToolResult(result))
            }
            other => Err(AgentError::UnexpectedMessage {
                agent: self.address.to_string(),
                message: format!("{:?}", other),
            }),
        }
    }
}
