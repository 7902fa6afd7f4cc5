//! 会话层：会话注册表、懒启动与一轮对话的入口

pub mod bootstrap;
pub mod manager;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::agents::{AgentDirectory, SessionRuntime};
use crate::core::SessionSupervisor;
use crate::memory::SessionContext;
use crate::tools::ToolCatalog;

pub use manager::{SessionManager, SessionManagerBuilder};

/// 会话 ID
pub type SessionId = String;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// 一个已启动的会话：运行时、上下文句柄、目录与工具目录
pub struct SessionHandle {
    session: Session,
    runtime: Arc<SessionRuntime>,
    context: SessionContext,
    directory: Arc<AgentDirectory>,
    catalog: Arc<ToolCatalog>,
    supervisor: SessionSupervisor,
    /// 同一会话的多轮对话串行执行
    turn_lock: Mutex<()>,
}

impl SessionHandle {
    pub(crate) fn new(
        session: Session,
        runtime: SessionRuntime,
        context: SessionContext,
        directory: Arc<AgentDirectory>,
        catalog: Arc<ToolCatalog>,
        supervisor: SessionSupervisor,
    ) -> Self {
        Self {
            session,
            runtime: Arc::new(runtime),
            context,
            directory,
            catalog,
            supervisor,
            turn_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.session.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn runtime(&self) -> &Arc<SessionRuntime> {
        &self.runtime
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn directory(&self) -> &Arc<AgentDirectory> {
        &self.directory
    }

    pub fn catalog(&self) -> &Arc<ToolCatalog> {
        &self.catalog
    }

    /// (运行时, 上下文句柄)
    pub fn parts(&self) -> (Arc<SessionRuntime>, SessionContext) {
        (Arc::clone(&self.runtime), self.context.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.supervisor.is_cancelled()
    }

    pub(crate) fn turn_lock(&self) -> &Mutex<()> {
        &self.turn_lock
    }

    /// 取消会话内所有进行中的调用并停止运行时
    pub(crate) fn shut(&self) {
        self.supervisor.cancel();
        self.runtime.stop();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session", &self.session)
            .field("agents", &self.runtime.addresses().len())
            .field("tools", &self.catalog.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
