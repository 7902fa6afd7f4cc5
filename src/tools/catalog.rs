//! 工具目录：把所有类别的工具按类别顺序展平成一张表，供规划器选择
//!
//! 同样的注册顺序总是得到同样的目录（包括 to_prompt_json 的字节内容）。

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::core::AgentError;
use crate::tools::{ToolCategory, ToolDescriptor};

/// 目录项：所属角色 + 工具描述
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCatalogEntry {
    pub role: String,
    pub tool: ToolDescriptor,
}

impl fmt::Display for ToolCatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.role, self.tool.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCatalog {
    entries: Vec<ToolCatalogEntry>,
}

impl ToolCatalog {
    pub fn entries(&self) -> &[ToolCatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, role: &str, tool: &str) -> bool {
        self.get(role, tool).is_some()
    }

    pub fn get(&self, role: &str, tool: &str) -> Option<&ToolCatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.role == role && e.tool.name == tool)
    }

    pub fn entries_for<'a>(&'a self, role: &'a str) -> impl Iterator<Item = &'a ToolCatalogEntry> + 'a {
        self.entries.iter().filter(move |e| e.role == role)
    }

    /// 渲染为规划器 system prompt 中的工具列表
    pub fn to_prompt_json(&self) -> String {
        let items: Vec<serde_json::Value> = self
            .entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "agent": e.role,
                    "function": e.tool.name,
                    "description": e.tool.description,
                    "arguments": e.tool.parameters,
                })
            })
            .collect();
        serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".to_string())
    }
}

/// 按给定类别顺序构建目录；(角色, 工具名) 重复立即返回 DuplicateTool
pub fn build_catalog<'a, I>(categories: I) -> Result<ToolCatalog, AgentError>
where
    I: IntoIterator<Item = &'a ToolCategory>,
{
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut entries = Vec::new();
    for category in categories {
        for descriptor in category.descriptors() {
            let key = (category.name().to_string(), descriptor.name.clone());
            if !seen.insert(key) {
                return Err(AgentError::DuplicateTool {
                    role: category.name().to_string(),
                    tool: descriptor.name,
                });
            }
            entries.push(ToolCatalogEntry {
                role: category.name().to_string(),
                tool: descriptor,
            });
        }
    }
    tracing::debug!(entries = entries.len(), "tool catalog built");
    Ok(ToolCatalog { entries })
}
