//! 固定角色表
//!
//! 每个会话按 ROLE_TABLE 注册：人类代理、规划器、若干能力角色。
//! 能力角色额外提供工具类别，类别名必须等于角色名。

use std::fmt;

use serde::Serialize;

use crate::agents::capability::CapabilityAgent;
use crate::agents::human::HumanAgent;
use crate::agents::planner::PlannerAgent;
use crate::agents::runtime::AgentConstructor;
use crate::capabilities::{diagram_developer, solution_architect, verification_assistant};
use crate::tools::ToolCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Human,
    Planner,
    SolutionArchitect,
    DiagramDeveloper,
    VerificationAssistant,
}

impl AgentRole {
    pub const ALL: [AgentRole; 5] = [
        AgentRole::Human,
        AgentRole::Planner,
        AgentRole::SolutionArchitect,
        AgentRole::DiagramDeveloper,
        AgentRole::VerificationAssistant,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AgentRole::Human => "human",
            AgentRole::Planner => "planner",
            AgentRole::SolutionArchitect => solution_architect::ROLE,
            AgentRole::DiagramDeveloper => diagram_developer::ROLE,
            AgentRole::VerificationAssistant => verification_assistant::ROLE,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 角色声明：构造函数 + 可选工具类别 + system prompt
#[derive(Clone, Copy)]
pub struct RoleSpec {
    pub role: AgentRole,
    pub constructor: AgentConstructor,
    pub tools: Option<fn() -> ToolCategory>,
    pub system_prompt: &'static str,
}

impl fmt::Debug for RoleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoleSpec")
            .field("role", &self.role)
            .field("has_tools", &self.tools.is_some())
            .finish()
    }
}

const HUMAN_PROMPT: &str = "You relay what the human user says into the group conversation.";

const PLANNER_PROMPT: &str = "You are the Planner. You read the conversation and decide the next step: either answer the user directly, or delegate one step to exactly one of the available agents.";

pub static ROLE_TABLE: &[RoleSpec] = &[
    RoleSpec {
        role: AgentRole::Human,
        constructor: HumanAgent::create,
        tools: None,
        system_prompt: HUMAN_PROMPT,
    },
    RoleSpec {
        role: AgentRole::Planner,
        constructor: PlannerAgent::create,
        tools: None,
        system_prompt: PLANNER_PROMPT,
    },
    RoleSpec {
        role: AgentRole::SolutionArchitect,
        constructor: CapabilityAgent::create,
        tools: Some(solution_architect::category),
        system_prompt: solution_architect::SYSTEM_PROMPT,
    },
    RoleSpec {
        role: AgentRole::DiagramDeveloper,
        constructor: CapabilityAgent::create,
        tools: Some(diagram_developer::category),
        system_prompt: diagram_developer::SYSTEM_PROMPT,
    },
    RoleSpec {
        role: AgentRole::VerificationAssistant,
        constructor: CapabilityAgent::create,
        tools: Some(verification_assistant::category),
        system_prompt: verification_assistant::SYSTEM_PROMPT,
    },
];
