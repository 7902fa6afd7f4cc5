//! SQLite 上下文存储
//!
//! rusqlite 是同步 API，所有读写放进 spawn_blocking，并在外层加超时，避免阻塞其它会话。
//! 表名为 `<database>_<container>`，仅允许字母、数字与下划线。

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::core::AgentError;
use crate::memory::store::ContextStore;
use crate::memory::{Message, Role};

pub struct SqliteContextStore {
    conn: Arc<Mutex<Connection>>,
    table: String,
    timeout: Duration,
}

impl SqliteContextStore {
    /// 打开（或创建）数据库文件并建表
    pub async fn open(
        path: impl AsRef<Path>,
        database: &str,
        container: &str,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        let table = table_name(database, container)?;
        let conn = open_connection(path.as_ref().to_path_buf(), timeout).await?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            table,
            timeout,
        };
        store.init_table().await?;
        Ok(store)
    }

    async fn init_table(&self) -> Result<(), AgentError> {
        let create = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                source TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{table}_session ON {table}(session_id);",
            table = self.table
        );
        self.run(move |conn| conn.execute_batch(&create)).await
    }

    /// 在阻塞线程池中执行一次数据库操作，带超时
    async fn run<T, F>(&self, f: F) -> Result<T, AgentError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let task = tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| "sqlite connection poisoned".to_string())?;
            f(&*guard).map_err(|e| e.to_string())
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(AgentError::PersistenceError(e)),
            Ok(Err(join)) => Err(AgentError::PersistenceError(join.to_string())),
            Err(_) => Err(AgentError::PersistenceError(format!(
                "sqlite operation timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    async fn append(&self, session_id: &str, message: &Message) -> Result<(), AgentError> {
        let sql = format!(
            "INSERT INTO {} (session_id, role, content, source, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            self.table
        );
        let session_id = session_id.to_string();
        let role = message.role.as_str();
        let content = message.content.clone();
        let source = message.source.clone();
        let now = chrono::Utc::now().to_rfc3339();
        self.run(move |conn| {
            conn.execute(&sql, params![session_id, role, content, source, now])
                .map(|_| ())
        })
        .await
    }

    async fn get_context(&self, session_id: &str) -> Result<Vec<Message>, AgentError> {
        let sql = format!(
            "SELECT role, content, source FROM {} WHERE session_id = ?1 ORDER BY id ASC",
            self.table
        );
        let session_id = session_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![session_id], |row| {
                let role: String = row.get(0)?;
                Ok(Message {
                    role: Role::parse(&role),
                    content: row.get(1)?,
                    source: row.get(2)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
    }
}

/// 建目录与打开连接同样放进阻塞线程池并受超时约束
async fn open_connection(path: PathBuf, timeout: Duration) -> Result<Connection, AgentError> {
    let task = tokio::task::spawn_blocking(move || {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| format!("create {:?}: {e}", parent))?;
        }
        Connection::open(&path).map_err(|e| format!("open {:?}: {e}", path))
    });

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(conn))) => Ok(conn),
        Ok(Ok(Err(e))) => Err(AgentError::PersistenceError(e)),
        Ok(Err(join)) => Err(AgentError::PersistenceError(join.to_string())),
        Err(_) => Err(AgentError::PersistenceError(format!(
            "sqlite open timed out after {:?}",
            timeout
        ))),
    }
}

fn table_name(database: &str, container: &str) -> Result<String, AgentError> {
    let valid = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid(database) || !valid(container) {
        return Err(AgentError::ConfigError(format!(
            "store database/container must be [A-Za-z0-9_]+: {database}/{container}"
        )));
    }
    Ok(format!("{database}_{container}"))
}
