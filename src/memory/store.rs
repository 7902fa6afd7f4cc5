//! 会话上下文存储抽象
//!
//! 编排核心只把存储当作已打开的句柄使用：append / get_context。
//! ContextStoreFactory 在会话启动时按 [store] 配置打开句柄；`memory://` 为进程内实现，
//! `sqlite://<path>` 为 SQLite 实现（见 sqlite.rs）。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::{StoreParams, StoreSection};
use crate::core::AgentError;
use crate::memory::sqlite::SqliteContextStore;
use crate::memory::Message;

/// 持久化上下文存储接口
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// 追加一条消息；失败返回 PersistenceError
    async fn append(&self, session_id: &str, message: &Message) -> Result<(), AgentError>;

    /// 按写入顺序返回会话全部消息
    async fn get_context(&self, session_id: &str) -> Result<Vec<Message>, AgentError>;
}

/// 进程内存储（memory:// 与测试使用）
#[derive(Default)]
pub struct InMemoryContextStore {
    messages: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    async fn append(&self, session_id: &str, message: &Message) -> Result<(), AgentError> {
        self.messages
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn get_context(&self, session_id: &str) -> Result<Vec<Message>, AgentError> {
        Ok(self
            .messages
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// 绑定到单个会话的上下文句柄，供各 Agent 共享
#[derive(Clone)]
pub struct SessionContext {
    store: Arc<dyn ContextStore>,
    session_id: String,
}

impl SessionContext {
    pub fn new(store: Arc<dyn ContextStore>, session_id: impl Into<String>) -> Self {
        Self {
            store,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn append(&self, message: Message) -> Result<(), AgentError> {
        self.store.append(&self.session_id, &message).await
    }

    pub async fn messages(&self) -> Result<Vec<Message>, AgentError> {
        self.store.get_context(&self.session_id).await
    }

    /// 最近 n 条消息（用于拼 LLM 上下文）
    pub async fn recent(&self, n: usize) -> Result<Vec<Message>, AgentError> {
        let mut messages = self.messages().await?;
        let skip = messages.len().saturating_sub(n);
        Ok(messages.split_off(skip))
    }
}

/// 在会话启动时打开上下文存储
#[async_trait]
pub trait ContextStoreFactory: Send + Sync {
    async fn open(&self, session_id: &str) -> Result<Arc<dyn ContextStore>, AgentError>;
}

/// 按 [store] 配置打开存储
///
/// `memory://` 在工厂内共享同一个进程内存储（关闭后重建同一会话仍可读回历史）；
/// `sqlite://<path>` 每个会话打开独立连接。
pub struct ConfiguredStoreFactory {
    section: StoreSection,
    shared_memory: Arc<InMemoryContextStore>,
}

impl ConfiguredStoreFactory {
    pub fn new(section: StoreSection) -> Self {
        Self {
            section,
            shared_memory: Arc::new(InMemoryContextStore::new()),
        }
    }
}

#[async_trait]
impl ContextStoreFactory for ConfiguredStoreFactory {
    async fn open(&self, session_id: &str) -> Result<Arc<dyn ContextStore>, AgentError> {
        let params = self.section.require()?;
        let store = open_store(&params, &self.shared_memory).await?;
        tracing::debug!(
            session_id = %session_id,
            endpoint = %params.endpoint,
            database = %params.database,
            container = %params.container,
            "context store opened"
        );
        Ok(store)
    }
}

async fn open_store(
    params: &StoreParams,
    shared_memory: &Arc<InMemoryContextStore>,
) -> Result<Arc<dyn ContextStore>, AgentError> {
    let endpoint = params.endpoint.as_str();
    if endpoint == "memory://" || endpoint == "memory" {
        return Ok(shared_memory.clone());
    }
    if let Some(path) = endpoint.strip_prefix("sqlite://") {
        if path.is_empty() {
            return Err(AgentError::ConfigError(
                "store.endpoint sqlite:// requires a path".to_string(),
            ));
        }
        let store = SqliteContextStore::open(
            path,
            &params.database,
            &params.container,
            params.timeout,
        )
        .await?;
        return Ok(Arc::new(store));
    }
    Err(AgentError::ConfigError(format!(
        "unsupported store.endpoint scheme: {endpoint}"
    )))
}
