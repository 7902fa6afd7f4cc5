//! 工具分发器
//!
//! 每个会话、每个工具类别一个 ToolDispatcher。构造时校验类别并固定工具表；
//! dispatch(tool_name, args) 先查名、再校验参数，最后在超时内调用工具。
//! 未知工具与非法参数都不会触达工具本体；每次调用输出结构化审计日志（JSON）。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{Tool, ToolCategory};

pub struct ToolDispatcher {
    category: Arc<ToolCategory>,
    index: HashMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl ToolDispatcher {
    /// 校验类别（空名 / 非 object schema / 重名）后建立名称索引
    pub fn new(category: Arc<ToolCategory>, timeout: Duration) -> Result<Self, AgentError> {
        category.validate()?;
        let index = category
            .tools()
            .iter()
            .map(|t| (t.name().to_string(), Arc::clone(t)))
            .collect();
        Ok(Self {
            category,
            index,
            timeout,
        })
    }

    pub fn category(&self) -> &ToolCategory {
        &self.category
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.category
            .tools()
            .iter()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// 执行一次工具调用
    ///
    /// 未知工具 → ToolNotFound；参数不符 → InvalidArguments；工具返回 Err → ToolExecutionFailed；
    /// 超时 → ToolTimeout。
    pub async fn dispatch(&self, tool_name: &str, args: Value) -> Result<String, AgentError> {
        let role = self.category.name();
        let qualified = format!("{}.{}", role, tool_name);
        let tool = self
            .index
            .get(tool_name)
            .cloned()
            .ok_or_else(|| AgentError::ToolNotFound(qualified.clone()))?;

        if let Err(reason) = tool.check_arguments(&args) {
            audit(role, tool_name, false, "invalid_arguments", 0, &args);
            return Err(AgentError::InvalidArguments {
                tool: qualified,
                reason,
            });
        }

        let start = Instant::now();
        let preview = args.clone();
        let result = timeout(self.timeout, tool.execute(args)).await;

        let (ok, outcome) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        audit(
            role,
            tool_name,
            ok,
            outcome,
            start.elapsed().as_millis() as u64,
            &preview,
        );

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(message)) => Err(AgentError::ToolExecutionFailed {
                tool: qualified,
                message,
            }),
            Err(_) => Err(AgentError::ToolTimeout(qualified)),
        }
    }
}

fn audit(role: &str, tool: &str, ok: bool, outcome: &str, duration_ms: u64, args: &Value) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "role": role,
        "tool": tool,
        "ok": ok,
        "outcome": outcome,
        "duration_ms": duration_ms,
        "args_preview": args_preview(args),
    });
    tracing::info!(audit = %audit.to_string(), "tool");
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FunctionTool;
    use async_trait::async_trait;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Deserialize, JsonSchema)]
    #[serde(deny_unknown_fields)]
    struct PingArgs {
        host: String,
    }

    fn ping(args: PingArgs) -> Result<String, String> {
        Ok(format!("pong from {}", args.host))
    }

    fn broken(_args: PingArgs) -> Result<String, String> {
        Err("backend unavailable".to_string())
    }

    /// 记录调用次数，用于断言「未触达工具本体」
    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "count"
        }
        fn description(&self) -> &str {
            "Counts invocations"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"n": {"type": "integer"}},
                "required": ["n"],
                "additionalProperties": false
            })
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("counted".to_string())
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Never finishes in time"
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    fn dispatcher(calls: Arc<AtomicUsize>) -> ToolDispatcher {
        let category = ToolCategory::new("alpha")
            .with_tool(FunctionTool::new("ping", "Ping a host", ping))
            .with_tool(FunctionTool::new("broken", "Always fails", broken))
            .with_tool(CountingTool { calls })
            .with_tool(SlowTool);
        ToolDispatcher::new(Arc::new(category), Duration::from_millis(100)).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_returns_tool_output_unchanged() {
        let d = dispatcher(Arc::new(AtomicUsize::new(0)));
        let out = d.dispatch("ping", json!({"host": "db"})).await.unwrap();
        assert_eq!(out, "pong from db");
    }

    #[tokio::test]
    async fn test_unknown_tool_invokes_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let d = dispatcher(calls.clone());
        match d.dispatch("nope", json!({"n": 1})).await {
            Err(AgentError::ToolNotFound(name)) => assert_eq!(name, "alpha.nope"),
            other => panic!("expected ToolNotFound, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_arguments_invoke_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let d = dispatcher(calls.clone());
        let err = d.dispatch("count", json!({"n": "one"})).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { .. }));
        let err = d.dispatch("count", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidArguments { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(d.dispatch("count", json!({"n": 1})).await.unwrap(), "counted");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tool_failure_carries_message() {
        let d = dispatcher(Arc::new(AtomicUsize::new(0)));
        match d.dispatch("broken", json!({"host": "x"})).await {
            Err(AgentError::ToolExecutionFailed { tool, message }) => {
                assert_eq!(tool, "alpha.broken");
                assert_eq!(message, "backend unavailable");
            }
            other => panic!("expected ToolExecutionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_tool_times_out() {
        let d = dispatcher(Arc::new(AtomicUsize::new(0)));
        let err = d.dispatch("slow", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_duplicate_tool_rejected_at_construction() {
        let category = ToolCategory::new("alpha")
            .with_tool(FunctionTool::new("x", "one", ping))
            .with_tool(FunctionTool::new("x", "two", ping));
        let result = ToolDispatcher::new(Arc::new(category), Duration::from_secs(1));
        assert!(matches!(result, Err(AgentError::DuplicateTool { .. })));
    }
}
