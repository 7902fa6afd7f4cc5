//! 工具与工具类别
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute）。
//! 每个能力角色提供一个 ToolCategory：名称 + 有序工具列表，启动后不可变。

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::schema::{empty_object_schema, parameters_schema, validate_arguments};

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（在所属类别内唯一）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认为无参数对象
    fn parameters_schema(&self) -> Value {
        empty_object_schema()
    }

    /// 调用前的参数校验；默认按 parameters_schema 校验
    fn check_arguments(&self, args: &Value) -> Result<(), String> {
        validate_arguments(&self.parameters_schema(), args)
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 把普通函数 `fn(A) -> Result<String, String>` 包装成工具，A 的 schema 由 schemars 生成
pub struct FunctionTool<A> {
    name: &'static str,
    description: &'static str,
    schema: Value,
    func: fn(A) -> Result<String, String>,
    _args: PhantomData<fn() -> A>,
}

impl<A> FunctionTool<A>
where
    A: DeserializeOwned + JsonSchema + Send + 'static,
{
    pub fn new(
        name: &'static str,
        description: &'static str,
        func: fn(A) -> Result<String, String>,
    ) -> Self {
        Self {
            name,
            description,
            schema: parameters_schema::<A>(),
            func,
            _args: PhantomData,
        }
    }

    fn decode(&self, args: Value) -> Result<A, String> {
        serde_json::from_value(args).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl<A> Tool for FunctionTool<A>
where
    A: DeserializeOwned + JsonSchema + Send + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    /// schema 校验之后再做一次类型化解码，保证 execute 不会因参数形状失败
    fn check_arguments(&self, args: &Value) -> Result<(), String> {
        validate_arguments(&self.schema, args)?;
        self.decode(args.clone()).map(|_| ())
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args = self.decode(args)?;
        (self.func)(args)
    }
}

/// 工具描述：供规划器与 LLM 使用
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    /// 所属类别（即角色名）
    pub category: String,
}

/// 工具类别：名称 + 有序工具列表
///
/// 构建时不去重；重复名与非法 schema 在 `validate` 中报错（分发器构造与目录构建都会调用）。
#[derive(Clone)]
pub struct ToolCategory {
    name: String,
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolCategory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// 按注册顺序返回描述
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .iter()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
                category: self.name.clone(),
            })
            .collect()
    }

    /// 校验类别：名称非空、schema 为 object、工具名不重复
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.name.trim().is_empty() {
            return Err(AgentError::RegistrationError(
                "tool category name is empty".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for tool in &self.tools {
            let name = tool.name();
            if name.trim().is_empty() {
                return Err(AgentError::RegistrationError(format!(
                    "tool with empty name in category {}",
                    self.name
                )));
            }
            if tool.parameters_schema().get("type").and_then(Value::as_str) != Some("object") {
                return Err(AgentError::RegistrationError(format!(
                    "parameters of {}.{} must be an object schema",
                    self.name, name
                )));
            }
            if !seen.insert(name) {
                return Err(AgentError::DuplicateTool {
                    role: self.name.clone(),
                    tool: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ToolCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCategory")
            .field("name", &self.name)
            .field(
                "tools",
                &self.tools.iter().map(|t| t.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
