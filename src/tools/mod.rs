//! Tool system
//!
//! - Catalog and specs for built-in tools
//! - Registry mapping names to executors or plugins
//! - Dispatcher gating every call through the safety gate

pub(crate) mod catalog;
mod context;
mod definition;
mod dispatcher;
mod executor;
mod launch;
mod registry;
mod result;
mod shell;

pub use catalog::ToolCatalog;
pub use context::ToolContext;
pub use definition::{ExecutorKind, ToolSpec};
pub use dispatcher::{DispatchOutcome, ToolDispatcher};
pub use executor::{ActionExecutor, ExecuteOptions};
pub use launch::LaunchExecutor;
pub use registry::{HandlerKind, ToolEntry, ToolRegistry};
pub use result::ToolResult;
pub use shell::ShellExecutor;
