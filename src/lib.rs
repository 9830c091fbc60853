//! essh library
//!
//! Turns Lua configuration scripts into validated hosts and tasks. Scripts
//! declare hosts (connection targets with hooks, tags and exported config)
//! and tasks (units of work with their targets and options), and can share
//! definitions through name-addressed modules loaded once per session.

pub mod cli;
pub mod context;
pub mod error;
pub mod hook;
pub mod host;
pub mod library;
pub mod module;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod task;
pub mod template;
pub mod value;

// Re-export main types for convenience
pub use context::TaskContext;
pub use error::{CallbackError, EsshError, LoaderError, Result, TemplateError};
pub use hook::{Hook, HookPoint};
pub use host::Host;
pub use module::{DirectoryLoader, ModuleLoader};
pub use session::{HookAction, Session};
pub use settings::Settings;
pub use task::Task;
pub use value::DynamicValue;
