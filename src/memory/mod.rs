//! 记忆层：消息模型与会话上下文存储（进程内 / SQLite）

pub mod conversation;
pub mod sqlite;
pub mod store;

pub use conversation::{Message, Role};
pub use sqlite::SqliteContextStore;
pub use store::{
    ConfiguredStoreFactory, ContextStore, ContextStoreFactory, InMemoryContextStore,
    SessionContext,
};
