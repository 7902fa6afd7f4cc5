//! 规划器：读会话上下文、工具目录与 Agent 目录，决定下一步
//!
//! LLM 输出为纯文本（直接回复）或 JSON：
//! `{"agent": "<role>", "tool": "<name>", "args": {...}, "instruction": "..."}`，tool / args / instruction 可省略。

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::agents::address::{AgentAddress, AgentDirectory};
use crate::agents::message::{AgentMessage, AgentReply, PlannerDecision, ToolCall};
use crate::agents::runtime::{Agent, AgentDeps, SessionRuntime};
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{Message, SessionContext};
use crate::tools::ToolCatalog;

/// 从模型输出中取出 JSON 片段（```json 代码块或首个 '{' 到最后一个 '}'）
pub fn extract_json(output: &str) -> Option<&str> {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

/// 解析模型输出中的 JSON 指令；纯文本返回 None
///
/// 整段输出以 '{' 开头或带 ```json 代码块时按 JSON 处理，解析失败为 JsonParseError；
/// 花括号只是夹在文字中（如 "use the {name} placeholder"）且解析不了时按纯文本处理。
pub(crate) fn parse_json_reply<T: DeserializeOwned>(output: &str) -> Result<Option<T>, AgentError> {
    let trimmed = output.trim();
    let Some(json) = extract_json(trimmed) else {
        return Ok(None);
    };
    match serde_json::from_str(json) {
        Ok(value) => Ok(Some(value)),
        Err(_) if !trimmed.starts_with('{') && !trimmed.contains("```json") => Ok(None),
        Err(e) => Err(AgentError::JsonParseError(format!("{}: {}", e, json))),
    }
}

#[derive(Debug, Deserialize)]
struct Delegation {
    #[serde(default)]
    agent: String,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    args: Option<Value>,
    #[serde(default)]
    instruction: Option<String>,
}

/// 解析规划器输出
///
/// 目标角色必须在目录中且持有工具；指定的工具必须在目录里，否则 ToolNotFound（可恢复）。
pub fn parse_planner_output(
    output: &str,
    directory: &AgentDirectory,
    catalog: &ToolCatalog,
) -> Result<PlannerDecision, AgentError> {
    let trimmed = output.trim();
    let Some(delegation) = parse_json_reply::<Delegation>(trimmed)? else {
        return Ok(PlannerDecision::Respond(trimmed.to_string()));
    };
    if delegation.agent.trim().is_empty() {
        return Ok(PlannerDecision::Respond(trimmed.to_string()));
    }

    let agent = delegation.agent.trim();
    let agent = agent.strip_suffix("_agent").unwrap_or(agent);
    let tool = delegation.tool.filter(|t| !t.trim().is_empty());
    let qualified = match &tool {
        Some(t) => format!("{}.{}", agent, t),
        None => agent.to_string(),
    };

    let role = directory
        .resolve(agent)
        .filter(|role| directory.tool_dispatch_address(*role).is_some())
        .ok_or_else(|| AgentError::ToolNotFound(qualified.clone()))?;

    let call = match tool {
        Some(tool) => {
            if !catalog.contains(role.name(), &tool) {
                return Err(AgentError::ToolNotFound(qualified));
            }
            Some(ToolCall::new(
                tool,
                delegation.args.unwrap_or_else(|| serde_json::json!({})),
            ))
        }
        None => None,
    };

    let instruction = delegation
        .instruction
        .filter(|i| !i.trim().is_empty())
        .unwrap_or_else(|| match &call {
            Some(c) => format!("Run {} for the latest user request.", c.tool),
            None => "Handle the latest user request.".to_string(),
        });

    Ok(PlannerDecision::Delegate {
        role,
        instruction,
        call,
    })
}

pub struct PlannerAgent {
    address: AgentAddress,
    llm: Arc<dyn LlmClient>,
    context: SessionContext,
    directory: Arc<AgentDirectory>,
    catalog: Arc<ToolCatalog>,
    history_window: usize,
    system_prompt: String,
}

impl PlannerAgent {
    pub fn create(deps: AgentDeps) -> Result<Box<dyn Agent>, AgentError> {
        let directory = deps.require(&deps.directory, "the agent directory")?;
        let catalog = deps.require(&deps.catalog, "the tool catalog")?;
        Ok(Box::new(Self {
            address: deps.address,
            llm: deps.llm,
            context: deps.context,
            directory,
            catalog,
            history_window: deps.history_window,
            system_prompt: deps.system_prompt,
        }))
    }

    fn system_message(&self) -> String {
        let agents: Vec<&str> = self
            .directory
            .entries()
            .iter()
            .filter(|e| e.tool_dispatch.is_some())
            .map(|e| e.role.name())
            .collect();
        format!(
            "{}\n\nAgents you can delegate to: {}\n\nAvailable functions:\n{}\n\n\
             To delegate reply with JSON only: {{\"agent\": \"<agent>\", \"tool\": \"<function>\", \"args\": {{...}}, \"instruction\": \"<what to do>\"}}. \
             Omit \"tool\" and \"args\" to let the agent pick a function. Otherwise answer in plain text.",
            self.system_prompt,
            agents.join(", "),
            self.catalog.to_prompt_json()
        )
    }
}

#[async_trait]
impl Agent for PlannerAgent {
    async fn handle(
        &mut self,
        message: AgentMessage,
        _runtime: &SessionRuntime,
    ) -> Result<AgentReply, AgentError> {
        if !matches!(message, AgentMessage::Plan) {
            return Err(AgentError::UnexpectedMessage {
                agent: self.address.to_string(),
                message: message.kind().to_string(),
            });
        }

        let mut messages = vec![Message::system(self.system_message())];
        messages.extend(self.context.recent(self.history_window).await?);
        let output = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)?;

        let decision = parse_planner_output(&output, &self.directory, &self.catalog)?;
        let note = match &decision {
            PlannerDecision::Respond(text) => text.clone(),
            PlannerDecision::Delegate {
                role, instruction, ..
            } => format!("Delegating to {}: {}", role, instruction),
        };
        tracing::info!(agent = %self.address, decision = %note, "planner decided");
        self.context
            .append(Message::assistant(note).with_source("planner"))
            .await?;
        Ok(AgentReply::Decision(decision))
    }
}
