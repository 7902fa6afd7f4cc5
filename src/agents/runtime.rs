//! 会话运行时：注册 → 启动 → 投递 → 停止
//!
//! 注册只记录 (地址, 构造函数, 依赖)；start 时才实例化全部 Agent，任何一个失败则整体失败。
//! 每个 Agent 在自己的异步锁后面，同一 Agent 的调用串行；会话取消后所有投递返回 Cancelled。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::agents::address::{AgentAddress, AgentDirectory};
use crate::agents::message::{AgentMessage, AgentReply};
use crate::agents::roles::AgentRole;
use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::SessionContext;
use crate::tools::{ToolCatalog, ToolCategory};

#[async_trait]
pub trait Agent: Send {
    async fn handle(
        &mut self,
        message: AgentMessage,
        runtime: &SessionRuntime,
    ) -> Result<AgentReply, AgentError>;
}

/// Agent 构造函数：只依赖显式传入的 AgentDeps
pub type AgentConstructor = fn(AgentDeps) -> Result<Box<dyn Agent>, AgentError>;

/// 构造 Agent 所需的全部依赖
#[derive(Clone)]
pub struct AgentDeps {
    pub address: AgentAddress,
    pub role: Option<AgentRole>,
    pub user_id: String,
    pub llm: Arc<dyn LlmClient>,
    pub context: SessionContext,
    /// 能力角色与工具分发 Agent 的工具类别
    pub tools: Option<Arc<ToolCategory>>,
    /// 能力角色对应的工具分发地址
    pub tool_dispatch: Option<AgentAddress>,
    pub directory: Option<Arc<AgentDirectory>>,
    pub catalog: Option<Arc<ToolCatalog>>,
    pub tool_timeout: Duration,
    pub history_window: usize,
    pub system_prompt: String,
}

impl AgentDeps {
    /// 取出必需依赖；缺失返回 RegistrationError
    pub fn require<T: Clone>(&self, value: &Option<T>, what: &str) -> Result<T, AgentError> {
        value.clone().ok_or_else(|| {
            AgentError::RegistrationError(format!("{} requires {}", self.address, what))
        })
    }

    pub fn require_role(&self) -> Result<AgentRole, AgentError> {
        self.require(&self.role, "a role")
    }
}

struct Registration {
    address: AgentAddress,
    constructor: AgentConstructor,
    deps: AgentDeps,
}

pub struct SessionRuntime {
    session_id: String,
    registrations: Vec<Registration>,
    agents: HashMap<AgentAddress, Mutex<Box<dyn Agent>>>,
    running: AtomicBool,
    cancel: CancellationToken,
}

impl SessionRuntime {
    pub fn new(session_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            session_id: session_id.into(),
            registrations: Vec::new(),
            agents: HashMap::new(),
            running: AtomicBool::new(false),
            cancel,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 登记一个 Agent；重复地址、跨会话地址、启动后登记都是 RegistrationError
    pub fn register(
        &mut self,
        address: AgentAddress,
        constructor: AgentConstructor,
        deps: AgentDeps,
    ) -> Result<(), AgentError> {
        if self.is_running() {
            return Err(AgentError::RegistrationError(format!(
                "runtime {} already started, cannot register {}",
                self.session_id, address
            )));
        }
        if address.session_id() != self.session_id {
            return Err(AgentError::RegistrationError(format!(
                "address {} does not belong to session {}",
                address, self.session_id
            )));
        }
        if self.registrations.iter().any(|r| r.address == address) {
            return Err(AgentError::RegistrationError(format!(
                "address {} is already registered",
                address
            )));
        }
        tracing::debug!(session_id = %self.session_id, agent = %address, "agent registered");
        self.registrations.push(Registration {
            address,
            constructor,
            deps,
        });
        Ok(())
    }

    /// 实例化全部已登记 Agent 并开始接受投递
    pub fn start(&mut self) -> Result<(), AgentError> {
        if self.is_running() {
            return Ok(());
        }
        let mut agents = HashMap::with_capacity(self.registrations.len());
        for reg in &self.registrations {
            let agent = (reg.constructor)(reg.deps.clone())?;
            agents.insert(reg.address.clone(), Mutex::new(agent));
        }
        self.agents = agents;
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            session_id = %self.session_id,
            agents = self.agents.len(),
            "session runtime started"
        );
        Ok(())
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!(session_id = %self.session_id, "session runtime stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_registered(&self, address: &AgentAddress) -> bool {
        self.registrations.iter().any(|r| &r.address == address)
    }

    /// 已登记地址（按登记顺序）
    pub fn addresses(&self) -> Vec<AgentAddress> {
        self.registrations.iter().map(|r| r.address.clone()).collect()
    }

    /// 投递消息并等待回复
    pub async fn send(
        &self,
        to: &AgentAddress,
        message: AgentMessage,
    ) -> Result<AgentReply, AgentError> {
        if self.cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        if !self.is_running() {
            return Err(AgentError::RuntimeNotRunning(self.session_id.clone()));
        }
        let cell = self
            .agents
            .get(to)
            .ok_or_else(|| AgentError::UnknownAgent(to.to_string()))?;

        tracing::debug!(agent = %to, message = message.kind(), "deliver");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(AgentError::Cancelled),
            reply = async {
                let mut agent = cell.lock().await;
                agent.handle(message, self).await
            } => reply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::memory::InMemoryContextStore;

    struct EchoAgent;

    #[async_trait]
    impl Agent for EchoAgent {
        async fn handle(
            &mut self,
            message: AgentMessage,
            _runtime: &SessionRuntime,
        ) -> Result<AgentReply, AgentError> {
            match message {
                AgentMessage::UserInput { text } => Ok(AgentReply::Text(text)),
                other => Err(AgentError::UnexpectedMessage {
                    agent: "echo".into(),
                    message: other.kind().into(),
                }),
            }
        }
    }

    struct StuckAgent;

    #[async_trait]
    impl Agent for StuckAgent {
        async fn handle(
            &mut self,
            _message: AgentMessage,
            _runtime: &SessionRuntime,
        ) -> Result<AgentReply, AgentError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(AgentReply::Ack)
        }
    }

    fn echo(_deps: AgentDeps) -> Result<Box<dyn Agent>, AgentError> {
        Ok(Box::new(EchoAgent))
    }

    fn stuck(_deps: AgentDeps) -> Result<Box<dyn Agent>, AgentError> {
        Ok(Box::new(StuckAgent))
    }

    fn failing(deps: AgentDeps) -> Result<Box<dyn Agent>, AgentError> {
        deps.require(&deps.tools, "a tool category")?;
        Ok(Box::new(EchoAgent))
    }

    fn deps(address: &AgentAddress) -> AgentDeps {
        AgentDeps {
            address: address.clone(),
            role: None,
            user_id: "u1".into(),
            llm: Arc::new(MockLlmClient),
            context: SessionContext::new(Arc::new(InMemoryContextStore::new()), "s1"),
            tools: None,
            tool_dispatch: None,
            directory: None,
            catalog: None,
            tool_timeout: Duration::from_secs(1),
            history_window: 10,
            system_prompt: String::new(),
        }
    }

    #[tokio::test]
    async fn test_register_start_send() {
        let mut runtime = SessionRuntime::new("s1", CancellationToken::new());
        let addr = AgentAddress::new("s1", "echo_agent");

        let early = runtime
            .send(&addr, AgentMessage::UserInput { text: "x".into() })
            .await;
        assert!(matches!(early, Err(AgentError::RuntimeNotRunning(_))));

        runtime.register(addr.clone(), echo, deps(&addr)).unwrap();
        runtime.start().unwrap();

        match runtime
            .send(&addr, AgentMessage::UserInput { text: "hi".into() })
            .await
            .unwrap()
        {
            AgentReply::Text(t) => assert_eq!(t, "hi"),
            other => panic!("unexpected reply {other:?}"),
        }

        let missing = AgentAddress::new("s1", "ghost_agent");
        assert!(matches!(
            runtime.send(&missing, AgentMessage::Plan).await,
            Err(AgentError::UnknownAgent(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut runtime = SessionRuntime::new("s1", CancellationToken::new());
        let addr = AgentAddress::new("s1", "echo_agent");
        runtime.register(addr.clone(), echo, deps(&addr)).unwrap();
        let err = runtime.register(addr.clone(), echo, deps(&addr)).unwrap_err();
        assert!(matches!(err, AgentError::RegistrationError(_)));
        assert_eq!(runtime.addresses().len(), 1);
    }

    #[test]
    fn test_foreign_session_address_rejected() {
        let mut runtime = SessionRuntime::new("s1", CancellationToken::new());
        let addr = AgentAddress::new("s2", "echo_agent");
        assert!(matches!(
            runtime.register(addr.clone(), echo, deps(&addr)),
            Err(AgentError::RegistrationError(_))
        ));
    }

    #[test]
    fn test_start_fails_on_incomplete_deps() {
        let mut runtime = SessionRuntime::new("s1", CancellationToken::new());
        let addr = AgentAddress::new("s1", "broken_agent");
        runtime.register(addr.clone(), failing, deps(&addr)).unwrap();
        assert!(matches!(
            runtime.start(),
            Err(AgentError::RegistrationError(_))
        ));
        assert!(!runtime.is_running());
    }

    #[tokio::test]
    async fn test_cancel_aborts_in_flight_send() {
        let token = CancellationToken::new();
        let mut runtime = SessionRuntime::new("s1", token.clone());
        let addr = AgentAddress::new("s1", "stuck_agent");
        runtime.register(addr.clone(), stuck, deps(&addr)).unwrap();
        runtime.start().unwrap();
        let runtime = Arc::new(runtime);

        let r = runtime.clone();
        let a = addr.clone();
        let pending = tokio::spawn(async move { r.send(&a, AgentMessage::Plan).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(AgentError::Cancelled)));
        assert!(matches!(
            runtime.send(&addr, AgentMessage::Plan).await,
            Err(AgentError::Cancelled)
        ));
    }
}
