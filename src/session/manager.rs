//! 会话注册表
//!
//! 进程内唯一的 session id → SessionHandle 表。首次交互时懒启动会话；同一 id 的并发启动
//! 由该 id 的启动锁 + 二次检查保证只产生一个会话，不同 id 的启动互不等待。
//! 关闭会话会取消其作用域；shutdown 之后不再接受新会话。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::agents::{AgentDirectory, AgentMessage, AgentReply, RoleSpec, TurnOutcome, ROLE_TABLE};
use crate::config::AppConfig;
use crate::core::{AgentError, SessionSupervisor};
use crate::llm::{create_llm_from_config, LlmClient, MockLlmClient};
use crate::memory::{ConfiguredStoreFactory, ContextStoreFactory};
use crate::safety::SafetyGate;
use crate::session::bootstrap::{bootstrap_session, catalog_for, role_categories, BootstrapDeps};
use crate::session::{Session, SessionHandle, SessionId};
use crate::tools::ToolCatalog;

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_HISTORY_WINDOW: usize = 20;

pub struct SessionManagerBuilder {
    llm: Option<Arc<dyn LlmClient>>,
    safety: Option<Arc<SafetyGate>>,
    store_factory: Option<Arc<dyn ContextStoreFactory>>,
    tool_timeout: Duration,
    history_window: usize,
    roles: Vec<RoleSpec>,
}

impl Default for SessionManagerBuilder {
    fn default() -> Self {
        Self {
            llm: None,
            safety: None,
            store_factory: None,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            history_window: DEFAULT_HISTORY_WINDOW,
            roles: ROLE_TABLE.to_vec(),
        }
    }
}

impl SessionManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置装配 LLM、存储工厂与安全闸；安全闸配置缺失时留空，build 时报错
    pub fn from_config(cfg: &AppConfig) -> Self {
        let safety = match SafetyGate::from_config(&cfg.safety) {
            Ok(gate) => Some(Arc::new(gate)),
            Err(e) => {
                tracing::warn!("Safety gate not configured ({})", e);
                None
            }
        };
        Self {
            llm: Some(create_llm_from_config(cfg)),
            safety,
            store_factory: Some(Arc::new(ConfiguredStoreFactory::new(cfg.store.clone()))),
            tool_timeout: Duration::from_secs(cfg.tools.tool_timeout_secs),
            history_window: cfg.app.history_window,
            roles: ROLE_TABLE.to_vec(),
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_safety_gate(mut self, gate: SafetyGate) -> Self {
        self.safety = Some(Arc::new(gate));
        self
    }

    pub fn with_store_factory(mut self, factory: Arc<dyn ContextStoreFactory>) -> Self {
        self.store_factory = Some(factory);
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    /// 替换角色表（默认 ROLE_TABLE）
    pub fn with_roles(mut self, roles: Vec<RoleSpec>) -> Self {
        self.roles = roles;
        self
    }

    /// 校验角色表与全部工具类别，构建一次工具目录；不合法的注册在这里失败
    pub fn build(self) -> Result<SessionManager, AgentError> {
        let safety = self.safety.ok_or_else(|| {
            AgentError::ConfigError("safety evaluator is not configured".to_string())
        })?;
        let store_factory = self.store_factory.ok_or_else(|| {
            AgentError::ConfigError("context store is not configured".to_string())
        })?;
        let llm = self.llm.unwrap_or_else(|| {
            tracing::warn!("No LLM client given, using Mock LLM");
            Arc::new(MockLlmClient)
        });

        AgentDirectory::build("init", &self.roles)?;
        let categories = role_categories(&self.roles)?;
        for (_, category) in &categories {
            category.validate()?;
        }
        let catalog = catalog_for(&categories)?;
        tracing::info!(
            roles = self.roles.len(),
            tools = catalog.len(),
            "session manager ready"
        );

        Ok(SessionManager {
            sessions: RwLock::new(HashMap::new()),
            bootstrapping: Mutex::new(HashMap::new()),
            roles: self.roles,
            catalog,
            llm,
            safety,
            store_factory,
            tool_timeout: self.tool_timeout,
            history_window: self.history_window,
            root: CancellationToken::new(),
            shut_down: AtomicBool::new(false),
        })
    }
}

pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Arc<SessionHandle>>>,
    /// 正在启动的 session id → 该 id 的启动锁
    bootstrapping: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
    roles: Vec<RoleSpec>,
    catalog: ToolCatalog,
    llm: Arc<dyn LlmClient>,
    safety: Arc<SafetyGate>,
    store_factory: Arc<dyn ContextStoreFactory>,
    tool_timeout: Duration,
    history_window: usize,
    root: CancellationToken,
    shut_down: AtomicBool,
}

impl SessionManager {
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::new()
    }

    /// 启动时构建的工具目录（与每个会话内的目录内容相同）
    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// 取得或懒启动会话
    ///
    /// session_id 为空或全空白时生成新 id；user_id 为空时生成。已存在的会话原样返回，
    /// 之后传入的不同 user_id 被忽略。
    pub async fn get_or_create(
        &self,
        session_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<Arc<SessionHandle>, AgentError> {
        if self.is_shut_down() {
            return Err(AgentError::ShutDown);
        }
        let id = non_blank(session_id).unwrap_or_else(new_id);

        if let Some(handle) = self.get(&id).await {
            return Ok(handle);
        }

        let gate = {
            let mut inflight = self.bootstrapping.lock().await;
            Arc::clone(inflight.entry(id.clone()).or_default())
        };
        let result = {
            let _guard = gate.lock().await;
            match self.get(&id).await {
                Some(handle) => Ok(handle),
                None => self.bootstrap(&id, user_id).await,
            }
        };

        let mut inflight = self.bootstrapping.lock().await;
        let idle = inflight
            .get(&id)
            .is_some_and(|g| Arc::ptr_eq(g, &gate) && Arc::strong_count(&gate) == 2);
        if idle {
            inflight.remove(&id);
        }
        result
    }

    /// 启动一个新会话；只有启动成功才写入注册表
    async fn bootstrap(
        &self,
        id: &str,
        user_id: Option<&str>,
    ) -> Result<Arc<SessionHandle>, AgentError> {
        if self.is_shut_down() {
            return Err(AgentError::ShutDown);
        }

        let user_id = non_blank(user_id).unwrap_or_else(new_id);
        let session = Session::new(id, user_id);
        let supervisor = SessionSupervisor::with_parent(&self.root);
        let deps = BootstrapDeps {
            roles: &self.roles,
            llm: Arc::clone(&self.llm),
            store_factory: self.store_factory.as_ref(),
            tool_timeout: self.tool_timeout,
            history_window: self.history_window,
        };

        let handle = match bootstrap_session(session, supervisor.clone(), deps).await {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                supervisor.cancel();
                tracing::warn!(session_id = %id, error = %e, "session bootstrap failed");
                return Err(e);
            }
        };

        let mut sessions = self.sessions.write().await;
        if self.is_shut_down() {
            handle.shut();
            return Err(AgentError::ShutDown);
        }
        if let Some(existing) = sessions.get(id) {
            handle.shut();
            return Ok(Arc::clone(existing));
        }
        sessions.insert(id.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 关闭会话：取消其作用域、停止运行时并从表中移除；不存在返回 false
    pub async fn close(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().await.remove(session_id);
        match removed {
            Some(handle) => {
                handle.shut();
                tracing::info!(session_id = %session_id, "session closed");
                true
            }
            None => false,
        }
    }

    /// 关闭全部会话；之后 get_or_create 返回 ShutDown
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        let drained: Vec<Arc<SessionHandle>> =
            self.sessions.write().await.drain().map(|(_, h)| h).collect();
        for handle in &drained {
            handle.shut();
        }
        self.root.cancel();
        tracing::info!(closed = drained.len(), "session manager shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// 取得或启动会话，然后提交一轮输入
    pub async fn handle_input(
        &self,
        session_id: Option<&str>,
        user_id: Option<&str>,
        text: &str,
    ) -> Result<(Arc<SessionHandle>, TurnOutcome), AgentError> {
        let handle = self.get_or_create(session_id, user_id).await?;
        let outcome = self.submit(&handle, text).await?;
        Ok((handle, outcome))
    }

    /// 提交一轮输入：安全闸 → 会话轮次锁 → 协调者
    ///
    /// 安全闸拒绝时返回 Declined，输入不进入任何 Agent、不写入上下文。
    /// 持久化失败对会话是致命的：会话被关闭并返回该错误。
    pub async fn submit(
        &self,
        handle: &SessionHandle,
        text: &str,
    ) -> Result<TurnOutcome, AgentError> {
        if handle.is_closed() {
            return Err(AgentError::Cancelled);
        }

        let verdict = self.safety.evaluate(text).await;
        if !verdict.approved {
            tracing::info!(session_id = %handle.id(), "input declined by safety gate");
            return Ok(TurnOutcome::Declined {
                reason: verdict.decision.reason(),
            });
        }

        let _turn = handle.turn_lock().lock().await;
        let coordinator = handle.directory().coordinator();
        let result = handle
            .runtime()
            .send(
                coordinator,
                AgentMessage::UserInput {
                    text: text.to_string(),
                },
            )
            .await;

        match result {
            Ok(AgentReply::Turn(outcome)) => Ok(outcome),
            Ok(other) => Err(AgentError::UnexpectedMessage {
                agent: coordinator.to_string(),
                message: format!("{:?}", other),
            }),
            Err(e) if e.is_session_fatal() => {
                tracing::error!(session_id = %handle.id(), error = %e, "closing session after persistence failure");
                self.close(handle.id()).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
