//! 工具分发 Agent：把 ToolDispatcher 挂到会话运行时上
//!
//! 可恢复的工具错误在这里变成失败的 ToolResult，不向上传播。

use async_trait::async_trait;

use crate::agents::message::{AgentMessage, AgentReply, ToolResult};
use crate::agents::runtime::{Agent, AgentDeps, SessionRuntime};
use crate::core::AgentError;
use crate::tools::ToolDispatcher;

pub struct ToolDispatchAgent {
    name: String,
    dispatcher: ToolDispatcher,
}

impl ToolDispatchAgent {
    pub fn create(deps: AgentDeps) -> Result<Box<dyn Agent>, AgentError> {
        let category = deps.require(&deps.tools, "a tool category")?;
        let dispatcher = ToolDispatcher::new(category, deps.tool_timeout)?;
        Ok(Box::new(Self {
            name: deps.address.to_string(),
            dispatcher,
        }))
    }
}

#[async_trait]
impl Agent for ToolDispatchAgent {
    async fn handle(
        &mut self,
        message: AgentMessage,
        _runtime: &SessionRuntime,
    ) -> Result<AgentReply, AgentError> {
        let call = match message {
            AgentMessage::ToolCall(call) => call,
            other => {
                return Err(AgentError::UnexpectedMessage {
                    agent: self.name.clone(),
                    message: other.kind().to_string(),
                })
            }
        };

        let result = match self.dispatcher.dispatch(&call.tool, call.args).await {
            Ok(content) => ToolResult {
                tool: call.tool,
                content,
                success: true,
            },
            Err(e) if e.is_recoverable() => {
                tracing::warn!(agent = %self.name, tool = %call.tool, error = %e, "tool call failed");
                ToolResult {
                    tool: call.tool,
                    content: e.to_string(),
                    success: false,
                }
            }
            Err(e) => return Err(e),
        };
        Ok(AgentReply::ToolResult(result))
    }
}
