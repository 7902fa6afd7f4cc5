//! 会话编排集成测试：懒启动、并发启动、一轮对话、安全闸、持久化失败

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hive::agents::{Agent, AgentDeps, AgentMessage, AgentRole, TurnOutcome, ROLE_TABLE};
use hive::config::StoreSection;
use hive::llm::LlmClient;
use hive::memory::{ConfiguredStoreFactory, ContextStore, ContextStoreFactory, Message, Role};
use hive::safety::{SafetyEvaluator, SafetyGate};
use hive::{AgentError, SessionManager, SessionManagerBuilder};

/// 按顺序返回预置输出的 LLM
struct ScriptedLlm {
    outputs: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(outputs: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            outputs: Mutex::new(outputs.iter().map(|s| s.to_string()).collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| "script exhausted".to_string())
    }
}

/// 固定返回某个内容的安全评估端
struct Evaluator(&'static str);

#[async_trait]
impl SafetyEvaluator for Evaluator {
    async fn evaluate(&self, _policy: &str, _text: &str) -> Result<String, String> {
        Ok(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": self.0}}]
        })
        .to_string())
    }
}

struct BrokenStore;

#[async_trait]
impl ContextStore for BrokenStore {
    async fn append(&self, _session_id: &str, _message: &Message) -> Result<(), AgentError> {
        Err(AgentError::PersistenceError("store unreachable".to_string()))
    }

    async fn get_context(&self, _session_id: &str) -> Result<Vec<Message>, AgentError> {
        Ok(Vec::new())
    }
}

/// open("slow") 先等待 2 秒，其余会话立即打开进程内存储
struct SlowStoreFactory {
    inner: ConfiguredStoreFactory,
}

#[async_trait]
impl ContextStoreFactory for SlowStoreFactory {
    async fn open(&self, session_id: &str) -> Result<Arc<dyn ContextStore>, AgentError> {
        if session_id == "slow" {
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        self.inner.open(session_id).await
    }
}

struct BrokenStoreFactory;

#[async_trait]
impl ContextStoreFactory for BrokenStoreFactory {
    async fn open(&self, _session_id: &str) -> Result<Arc<dyn ContextStore>, AgentError> {
        Ok(Arc::new(BrokenStore))
    }
}

fn store_section(endpoint: Option<&str>) -> StoreSection {
    StoreSection {
        endpoint: endpoint.map(String::from),
        database: Some("AutomationDatastore".to_string()),
        container: Some("SessionMemory".to_string()),
        ..StoreSection::default()
    }
}

fn builder(llm: Arc<dyn LlmClient>, verdict: &'static str) -> SessionManagerBuilder {
    SessionManager::builder()
        .with_llm(llm)
        .with_safety_gate(SafetyGate::new(Evaluator(verdict), Duration::from_secs(1)))
        .with_store_factory(Arc::new(ConfiguredStoreFactory::new(store_section(Some(
            "memory://",
        )))))
        .with_tool_timeout(Duration::from_secs(5))
}

fn manager(llm: Arc<dyn LlmClient>) -> SessionManager {
    builder(llm, "FALSE").build().unwrap()
}

#[tokio::test]
async fn test_get_or_create_is_idempotent() {
    let manager = manager(ScriptedLlm::new(&[]));
    let first = manager.get_or_create(Some("s1"), Some("u1")).await.unwrap();
    let second = manager.get_or_create(Some("s1"), Some("u1")).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.runtime().addresses(), second.runtime().addresses());
    assert_eq!(manager.active_count().await, 1);

    for role in AgentRole::ALL {
        let address = first.directory().address(role).unwrap();
        assert_eq!(address.session_id(), "s1");
        assert!(first.runtime().is_registered(address));
    }
    let names: Vec<String> = first
        .runtime()
        .addresses()
        .iter()
        .map(|a| a.to_string())
        .collect();
    assert!(names.contains(&"s1_solution_architect_tool_agent".to_string()));
    assert!(names.contains(&"s1_group_chat_manager".to_string()));
    assert_eq!(names.len(), 9);
}

#[tokio::test]
async fn test_missing_session_id_generates_one() {
    let manager = manager(ScriptedLlm::new(&[]));
    let a = manager.get_or_create(None, None).await.unwrap();
    let b = manager.get_or_create(None, None).await.unwrap();
    assert_ne!(a.id(), b.id());
    assert_ne!(a.session().user_id, b.session().user_id);
    assert_eq!(manager.active_count().await, 2);
}

#[tokio::test]
async fn test_concurrent_distinct_sessions_share_nothing() {
    let manager = Arc::new(manager(ScriptedLlm::new(&[])));
    let mut tasks = Vec::new();
    for i in 0..8 {
        let m = Arc::clone(&manager);
        tasks.push(tokio::spawn(async move {
            m.get_or_create(Some(&format!("session-{i}")), None)
                .await
                .unwrap()
        }));
    }
    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }

    let mut all = HashSet::new();
    let mut total = 0;
    for handle in &handles {
        for address in handle.runtime().addresses() {
            total += 1;
            all.insert(address.to_string());
        }
    }
    assert_eq!(all.len(), total);
    for (i, a) in handles.iter().enumerate() {
        for b in handles.iter().skip(i + 1) {
            assert!(!Arc::ptr_eq(a.runtime(), b.runtime()));
        }
    }
    assert_eq!(manager.active_count().await, 8);
}

#[tokio::test]
async fn test_concurrent_bootstrap_of_same_id_yields_one_session() {
    let manager = Arc::new(manager(ScriptedLlm::new(&[])));
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let m = Arc::clone(&manager);
        tasks.push(tokio::spawn(async move {
            m.get_or_create(Some("shared"), None).await.unwrap()
        }));
    }
    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }
    for handle in &handles[1..] {
        assert!(Arc::ptr_eq(&handles[0], handle));
    }
    assert_eq!(manager.active_count().await, 1);
}

#[tokio::test]
async fn test_slow_store_open_does_not_stall_other_sessions() {
    let manager = Arc::new(
        SessionManager::builder()
            .with_llm(ScriptedLlm::new(&[]))
            .with_safety_gate(SafetyGate::new(Evaluator("FALSE"), Duration::from_secs(1)))
            .with_store_factory(Arc::new(SlowStoreFactory {
                inner: ConfiguredStoreFactory::new(store_section(Some("memory://"))),
            }))
            .build()
            .unwrap(),
    );

    let m = Arc::clone(&manager);
    let slow = tokio::spawn(async move { m.get_or_create(Some("slow"), None).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = tokio::time::Instant::now();
    manager.get_or_create(Some("fast"), None).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));

    assert!(slow.await.unwrap().is_ok());
    assert_eq!(manager.active_count().await, 2);
}

#[tokio::test]
async fn test_missing_store_config_registers_nothing() {
    let manager = SessionManager::builder()
        .with_llm(ScriptedLlm::new(&[]))
        .with_safety_gate(SafetyGate::new(Evaluator("FALSE"), Duration::from_secs(1)))
        .with_store_factory(Arc::new(ConfiguredStoreFactory::new(store_section(None))))
        .build()
        .unwrap();

    match manager.get_or_create(Some("s1"), None).await {
        Err(AgentError::ConfigError(msg)) => assert!(msg.contains("store.endpoint")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
    assert_eq!(manager.active_count().await, 0);
    assert!(manager.get("s1").await.is_none());
}

fn broken_constructor(_deps: AgentDeps) -> Result<Box<dyn Agent>, AgentError> {
    Err(AgentError::RegistrationError("constructor failed".to_string()))
}

#[tokio::test]
async fn test_failed_registration_leaves_no_partial_session() {
    let mut roles = ROLE_TABLE.to_vec();
    roles[3].constructor = broken_constructor;
    let manager = builder(ScriptedLlm::new(&[]), "FALSE")
        .with_roles(roles)
        .build()
        .unwrap();

    for _ in 0..2 {
        let err = manager.get_or_create(Some("s1"), None).await.unwrap_err();
        assert!(matches!(err, AgentError::RegistrationError(_)));
    }
    assert_eq!(manager.active_count().await, 0);
}

#[tokio::test]
async fn test_planner_delegation_appends_tool_result() {
    let llm = ScriptedLlm::new(&[r#"{"agent": "solution_architect", "tool": "develop_migration_plan",
        "args": {"current_system": "A", "target_system": "B", "timeline": "6 months"},
        "instruction": "Plan the migration"}"#]);
    let manager = manager(llm.clone());

    let (handle, outcome) = manager
        .handle_input(Some("s1"), Some("u1"), "Plan a migration from A to B")
        .await
        .unwrap();

    match outcome {
        TurnOutcome::ToolResult { source, result } => {
            assert_eq!(source, "solution_architect");
            assert!(result.success);
            assert_eq!(result.tool, "develop_migration_plan");
            assert_eq!(
                result.content,
                "Migration plan developed for moving from 'A' to 'B' over 6 months."
            );
        }
        other => panic!("expected tool result, got {other:?}"),
    }

    let messages = handle.context().messages().await.unwrap();
    assert_eq!(messages.first().map(|m| m.role.clone()), Some(Role::User));
    let last = messages.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.source.as_deref(), Some("solution_architect"));
    assert_eq!(
        last.content,
        "Migration plan developed for moving from 'A' to 'B' over 6 months."
    );
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_capability_agent_chooses_tool_when_planner_does_not() {
    let llm = ScriptedLlm::new(&[
        r#"{"agent": "verification_assistant", "instruction": "Review the requirements"}"#,
        r#"```json
{"tool": "review_requirements", "args": {"project_name": "Hive", "requirements_list": ["auth", "audit"]}}
```"#,
    ]);
    let manager = manager(llm.clone());
    let (_, outcome) = manager
        .handle_input(Some("s1"), None, "Review the requirements for Hive")
        .await
        .unwrap();

    match outcome {
        TurnOutcome::ToolResult { source, result } => {
            assert_eq!(source, "verification_assistant");
            assert_eq!(result.content, "Requirements for 'Hive' reviewed: auth, audit.");
        }
        other => panic!("expected tool result, got {other:?}"),
    }
    assert_eq!(llm.calls(), 2);
}

#[tokio::test]
async fn test_capability_agent_plain_text_reply() {
    let llm = ScriptedLlm::new(&[
        r#"{"agent": "verification_assistant", "instruction": "Check the requirements"}"#,
        "No tool is needed, the requirements already look complete.",
    ]);
    let manager = manager(llm);
    let (handle, outcome) = manager
        .handle_input(Some("s1"), None, "Are the requirements complete?")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        TurnOutcome::Response {
            source: "verification_assistant".to_string(),
            text: "No tool is needed, the requirements already look complete.".to_string(),
        }
    );
    let messages = handle.context().messages().await.unwrap();
    let last = messages.last().unwrap();
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.source.as_deref(), Some("verification_assistant"));
}

#[tokio::test]
async fn test_malformed_capability_choice_is_reported_and_turns_continue() {
    let llm = ScriptedLlm::new(&[
        r#"{"agent": "verification_assistant", "instruction": "Review the requirements"}"#,
        r#"{"tool": "review_requirements", "args": }"#,
        "Let me know what else to check.",
    ]);
    let manager = manager(llm);
    let handle = manager.get_or_create(Some("s1"), None).await.unwrap();

    match manager.submit(&handle, "Review the requirements").await.unwrap() {
        TurnOutcome::ToolResult { source, result } => {
            assert_eq!(source, "verification_assistant");
            assert_eq!(result.tool, "task");
            assert!(!result.success);
            assert!(result.content.starts_with("JSON parse error"));
        }
        other => panic!("expected failed tool result, got {other:?}"),
    }
    let messages = handle.context().messages().await.unwrap();
    let last = messages.last().unwrap();
    assert_eq!(last.role, Role::Tool);
    assert_eq!(last.source.as_deref(), Some("verification_assistant"));
    assert!(!handle.is_closed());

    assert!(matches!(
        manager.submit(&handle, "Anything else?").await.unwrap(),
        TurnOutcome::Response { .. }
    ));
}

#[tokio::test]
async fn test_tool_errors_are_reported_and_conversation_continues() {
    let llm = ScriptedLlm::new(&[
        r#"{"agent": "verification_assistant", "tool": "validate_test_coverage",
            "args": {"system_name": "S", "test_types": ["unit"], "coverage_percentage": 250}}"#,
        r#"{"agent": "diagram_developer", "tool": "no_such_tool"}"#,
        "All done.",
    ]);
    let manager = manager(llm);
    let handle = manager.get_or_create(Some("s1"), None).await.unwrap();

    match manager.submit(&handle, "Check coverage").await.unwrap() {
        TurnOutcome::ToolResult { result, .. } => {
            assert!(!result.success);
            assert!(result.content.contains("coverage_percentage"));
        }
        other => panic!("expected failed tool result, got {other:?}"),
    }

    match manager.submit(&handle, "Draw something").await.unwrap() {
        TurnOutcome::ToolResult { source, result } => {
            assert_eq!(source, "planner");
            assert!(!result.success);
            assert!(result.content.contains("diagram_developer.no_such_tool"));
        }
        other => panic!("expected failed planning result, got {other:?}"),
    }

    assert_eq!(
        manager.submit(&handle, "Thanks").await.unwrap(),
        TurnOutcome::Response {
            source: "planner".to_string(),
            text: "All done.".to_string(),
        }
    );
}

#[tokio::test]
async fn test_declined_input_reaches_no_agent() {
    let llm = ScriptedLlm::new(&["should not be used"]);
    let manager = builder(llm.clone(), "TRUE").build().unwrap();

    let (handle, outcome) = manager
        .handle_input(Some("s1"), None, "say something rude")
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Declined { .. }));
    assert!(handle.context().messages().await.unwrap().is_empty());
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_persistence_failure_closes_session() {
    let manager = SessionManager::builder()
        .with_llm(ScriptedLlm::new(&["hello"]))
        .with_safety_gate(SafetyGate::new(Evaluator("FALSE"), Duration::from_secs(1)))
        .with_store_factory(Arc::new(BrokenStoreFactory))
        .build()
        .unwrap();

    let handle = manager.get_or_create(Some("s1"), None).await.unwrap();
    let err = manager.submit(&handle, "hi").await.unwrap_err();
    assert!(matches!(err, AgentError::PersistenceError(_)));
    assert!(handle.is_closed());
    assert_eq!(manager.active_count().await, 0);
}

#[tokio::test]
async fn test_close_cancels_session_runtime() {
    let manager = manager(ScriptedLlm::new(&[]));
    let handle = manager.get_or_create(Some("s1"), None).await.unwrap();
    let (runtime, _context) = handle.parts();

    assert!(manager.close("s1").await);
    assert!(handle.is_closed());
    let coordinator = handle.directory().coordinator().clone();
    let result = runtime
        .send(&coordinator, AgentMessage::UserInput { text: "hi".into() })
        .await;
    assert!(matches!(result, Err(AgentError::Cancelled)));

    let fresh = manager.get_or_create(Some("s1"), None).await.unwrap();
    assert!(!Arc::ptr_eq(&fresh, &handle));
    assert!(!fresh.is_closed());
}

#[tokio::test]
async fn test_sqlite_context_survives_session_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let endpoint = format!("sqlite://{}", dir.path().join("hive.db").display());
    let section = store_section(Some(endpoint.as_str()));
    let factory: Arc<dyn ContextStoreFactory> = Arc::new(ConfiguredStoreFactory::new(section));

    let manager = SessionManager::builder()
        .with_llm(ScriptedLlm::new(&["First answer.", "Second answer."]))
        .with_safety_gate(SafetyGate::new(Evaluator("FALSE"), Duration::from_secs(1)))
        .with_store_factory(factory)
        .build()
        .unwrap();

    let (_, outcome) = manager
        .handle_input(Some("s1"), None, "first question")
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Response { .. }));
    assert!(manager.close("s1").await);

    let (handle, _) = manager
        .handle_input(Some("s1"), None, "second question")
        .await
        .unwrap();
    let contents: Vec<String> = handle
        .context()
        .messages()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(
        contents,
        vec![
            "first question",
            "First answer.",
            "second question",
            "Second answer."
        ]
    );
}
