//! 工具层：工具 trait、工具类别、分发器与工具目录

pub mod catalog;
pub mod dispatcher;
pub mod registry;
pub mod schema;

pub use catalog::{build_catalog, ToolCatalog, ToolCatalogEntry};
pub use dispatcher::ToolDispatcher;
pub use registry::{FunctionTool, Tool, ToolCategory, ToolDescriptor};
pub use schema::{parameters_schema, validate_arguments};
