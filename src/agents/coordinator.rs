//! 群聊协调者：推进一轮对话
//!
//! 用户输入 → 人类代理记录 → 规划器决定 → （可选）交给能力角色执行工具。
//! 规划与委派阶段的可恢复错误（坏 JSON、目录外的工具、参数不符）记为失败的工具结果，对话继续。

use std::sync::Arc;

use async_trait::async_trait;

use crate::agents::address::{AgentAddress, AgentDirectory};
use crate::agents::message::{
    AgentMessage, AgentReply, PlannerDecision, ToolCall, ToolResult, TurnOutcome,
};
use crate::agents::roles::AgentRole;
use crate::agents::runtime::{Agent, AgentDeps, SessionRuntime};
use crate::core::AgentError;
use crate::memory::{Message, SessionContext};

pub struct GroupCoordinator {
    address: AgentAddress,
    directory: Arc<AgentDirectory>,
    context: SessionContext,
    human: AgentAddress,
    planner: AgentAddress,
}

impl GroupCoordinator {
    pub fn create(deps: AgentDeps) -> Result<Box<dyn Agent>, AgentError> {
        let directory = deps.require(&deps.directory, "the agent directory")?;
        let lookup = |role: AgentRole| {
            directory.address(role).cloned().ok_or_else(|| {
                AgentError::RegistrationError(format!(
                    "session {} has no {} role",
                    directory.session_id(),
                    role
                ))
            })
        };
        let human = lookup(AgentRole::Human)?;
        let planner = lookup(AgentRole::Planner)?;
        Ok(Box::new(Self {
            address: deps.address,
            directory,
            context: deps.context,
            human,
            planner,
        }))
    }

    fn unexpected(&self, from: &AgentAddress, reply: AgentReply) -> AgentError {
        AgentError::UnexpectedMessage {
            agent: from.to_string(),
            message: format!("{:?}", reply),
        }
    }

    async fn plan(&self, runtime: &SessionRuntime) -> Result<PlannerDecision, AgentError> {
        match runtime.send(&self.planner, AgentMessage::Plan).await? {
            AgentReply::Decision(decision) => Ok(decision),
            other => Err(self.unexpected(&self.planner, other)),
        }
    }

    async fn delegate(
        &self,
        runtime: &SessionRuntime,
        role: AgentRole,
        instruction: String,
        call: Option<ToolCall>,
    ) -> Result<TurnOutcome, AgentError> {
        let target = self
            .directory
            .address(role)
            .ok_or_else(|| AgentError::UnknownAgent(role.name().to_string()))?;
        match runtime
            .send(target, AgentMessage::Task { instruction, call })
            .await?
        {
            AgentReply::ToolResult(result) => Ok(TurnOutcome::ToolResult {
                source: role.name().to_string(),
                result,
            }),
            AgentReply::Text(text) => Ok(TurnOutcome::Response {
                source: role.name().to_string(),
                text,
            }),
            other => Err(self.unexpected(target, other)),
        }
    }

    /// 可恢复错误记为失败的工具结果，写入上下文后对话继续
    async fn report_failure(
        &self,
        source: AgentRole,
        tool: String,
        error: AgentError,
    ) -> Result<TurnOutcome, AgentError> {
        tracing::warn!(
            session_id = %self.directory.session_id(),
            agent = %source,
            tool = %tool,
            error = %error,
            "turn step failed"
        );
        let result = ToolResult {
            tool,
            content: error.to_string(),
            success: false,
        };
        self.context
            .append(Message::tool(result.content.clone()).with_source(source.name()))
            .await?;
        Ok(TurnOutcome::ToolResult {
            source: source.name().to_string(),
            result,
        })
    }
}

#[async_trait]
impl Agent for GroupCoordinator {
    async fn handle(
        &mut self,
        message: AgentMessage,
        runtime: &SessionRuntime,
    ) -> Result<AgentReply, AgentError> {
        let text = match message {
            AgentMessage::UserInput { text } => text,
            other => {
                return Err(AgentError::UnexpectedMessage {
                    agent: self.address.to_string(),
                    message: other.kind().to_string(),
                })
            }
        };

        runtime
            .send(&self.human, AgentMessage::UserInput { text })
            .await?;

        let outcome = match self.plan(runtime).await {
            Ok(PlannerDecision::Respond(text)) => TurnOutcome::Response {
                source: AgentRole::Planner.name().to_string(),
                text,
            },
            Ok(PlannerDecision::Delegate {
                role,
                instruction,
                call,
            }) => {
                let tool = call
                    .as_ref()
                    .map(|c| c.tool.clone())
                    .unwrap_or_else(|| "task".to_string());
                match self.delegate(runtime, role, instruction, call).await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_recoverable() => self.report_failure(role, tool, e).await?,
                    Err(e) => return Err(e),
                }
            }
            Err(e) if e.is_recoverable() => {
                self.report_failure(AgentRole::Planner, "plan".to_string(), e)
                    .await?
            }
            Err(e) => return Err(e),
        };
        Ok(AgentReply::Turn(outcome))
    }
}
