//! 会话内的 Agent 地址与目录
//!
//! 地址 = (会话 id, 名称)，渲染为 `{session_id}_{name}`。角色 Agent 名为 `{role}_agent`，
//! 工具分发 Agent 名为 `{role}_tool_agent`，协调者固定为 `group_chat_manager`。

use std::fmt;

use serde::Serialize;

use crate::agents::roles::{AgentRole, RoleSpec};
use crate::core::AgentError;

pub const COORDINATOR_NAME: &str = "group_chat_manager";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AgentAddress {
    session_id: String,
    name: String,
}

impl AgentAddress {
    pub fn new(session_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            name: name.into(),
        }
    }

    pub fn for_role(session_id: &str, role: AgentRole) -> Self {
        Self::new(session_id, format!("{}_agent", role.name()))
    }

    pub fn tool_dispatch(session_id: &str, role: AgentRole) -> Self {
        Self::new(session_id, format!("{}_tool_agent", role.name()))
    }

    pub fn coordinator(session_id: &str) -> Self {
        Self::new(session_id, COORDINATOR_NAME)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for AgentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.session_id, self.name)
    }
}

/// 目录项：角色、其地址、以及（若该角色持有工具）对应的工具分发地址
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub role: AgentRole,
    pub address: AgentAddress,
    pub tool_dispatch: Option<AgentAddress>,
}

/// 角色 → 地址表；会话启动时构建一次，之后只读共享给协调者与规划器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDirectory {
    session_id: String,
    entries: Vec<DirectoryEntry>,
    coordinator: AgentAddress,
}

impl AgentDirectory {
    /// 按角色表顺序构建；同一角色出现两次返回 RegistrationError
    pub fn build(session_id: &str, roles: &[RoleSpec]) -> Result<Self, AgentError> {
        let mut entries: Vec<DirectoryEntry> = Vec::with_capacity(roles.len());
        for spec in roles {
            if entries.iter().any(|e| e.role == spec.role) {
                return Err(AgentError::RegistrationError(format!(
                    "role {} is declared twice",
                    spec.role
                )));
            }
            entries.push(DirectoryEntry {
                role: spec.role,
                address: AgentAddress::for_role(session_id, spec.role),
                tool_dispatch: spec
                    .tools
                    .map(|_| AgentAddress::tool_dispatch(session_id, spec.role)),
            });
        }
        Ok(Self {
            session_id: session_id.to_string(),
            entries,
            coordinator: AgentAddress::coordinator(session_id),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn roles(&self) -> impl Iterator<Item = AgentRole> + '_ {
        self.entries.iter().map(|e| e.role)
    }

    pub fn contains(&self, role: AgentRole) -> bool {
        self.entry(role).is_some()
    }

    pub fn address(&self, role: AgentRole) -> Option<&AgentAddress> {
        self.entry(role).map(|e| &e.address)
    }

    pub fn tool_dispatch_address(&self, role: AgentRole) -> Option<&AgentAddress> {
        self.entry(role).and_then(|e| e.tool_dispatch.as_ref())
    }

    pub fn coordinator(&self) -> &AgentAddress {
        &self.coordinator
    }

    /// 按角色名查找（规划器输出中的 "agent" 字段）
    pub fn resolve(&self, name: &str) -> Option<AgentRole> {
        AgentRole::parse(name).filter(|role| self.contains(*role))
    }

    /// 会话内全部地址：角色 Agent、工具分发 Agent、协调者
    pub fn all_addresses(&self) -> Vec<AgentAddress> {
        let mut out: Vec<AgentAddress> = self
            .entries
            .iter()
            .flat_map(|e| std::iter::once(e.address.clone()).chain(e.tool_dispatch.clone()))
            .collect();
        out.push(self.coordinator.clone());
        out
    }

    fn entry(&self, role: AgentRole) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| e.role == role)
    }
}
