//! 人类代理：把用户输入记入会话上下文

use async_trait::async_trait;

use crate::agents::message::{AgentMessage, AgentReply};
use crate::agents::runtime::{Agent, AgentDeps, SessionRuntime};
use crate::core::AgentError;
use crate::memory::{Message, SessionContext};

pub struct HumanAgent {
    user_id: String,
    context: SessionContext,
}

impl HumanAgent {
    pub fn create(deps: AgentDeps) -> Result<Box<dyn Agent>, AgentError> {
        Ok(Box::new(Self {
            user_id: deps.user_id,
            context: deps.context,
        }))
    }
}

#[async_trait]
impl Agent for HumanAgent {
    async fn handle(
        &mut self,
        message: AgentMessage,
        _runtime: &SessionRuntime,
    ) -> Result<AgentReply, AgentError> {
        match message {
            AgentMessage::UserInput { text } => {
                tracing::debug!(user_id = %self.user_id, "user input recorded");
                self.context
                    .append(Message::user(text).with_source("human"))
                    .await?;
                Ok(AgentReply::Ack)
            }
            other => Err(AgentError::UnexpectedMessage {
                agent: "human".to_string(),
                message: other.kind().to_string(),
            }),
        }
    }
}
