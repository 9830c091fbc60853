//! Error handling module for essh
//!
//! Provides the error taxonomy used across configuration evaluation:
//! validation failures raised by the host/task builders, callback failures
//! captured from protected calls, and module loading failures.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for essh
#[derive(Error, Debug, Clone)]
pub enum EsshError {
    /// Invalid host/task definition (mutually exclusive options, bad shapes)
    #[error("{0}")]
    Validation(String),

    /// A hook or prepare callback failed
    #[error(transparent)]
    Callback(#[from] CallbackError),

    /// A module could not be materialized or evaluated
    #[error("Could not load essh module '{module}': {reason}")]
    Loader { module: String, reason: String },

    /// A module required itself, directly or through other modules
    #[error("Cyclic module require: {}", .chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    /// Settings errors (loading, parsing, discovery)
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors (reading configuration files)
    #[error("IO error: {0}")]
    Io(String),

    /// Any other error surfaced by the Lua runtime
    #[error("Lua error: {0}")]
    Lua(mlua::Error),
}

/// Failure of a script callback invoked through a protected call.
#[derive(Error, Debug, Clone)]
pub enum CallbackError {
    /// `prepare` explicitly returned `false`
    #[error("returned false from the prepare function.")]
    ReturnedFalse,

    /// The callback raised a runtime error; carried verbatim
    #[error("{0}")]
    Runtime(mlua::Error),
}

/// Errors reported by a [`crate::module::ModuleLoader`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    /// No module with this name could be found
    #[error("module '{name}' not found")]
    NotFound { name: String },

    /// The module exists but could not be fetched or prepared
    #[error("failed to fetch module '{name}': {reason}")]
    Fetch { name: String, reason: String },

    /// The loader returned an index file that does not exist
    #[error("index file {} is not accessible", .path.display())]
    MissingIndex { path: PathBuf },
}

/// Errors rendering an `essh.template` template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// `{{` with no matching `}}`
    #[error("unclosed action starting at byte {0}")]
    Unclosed(usize),

    /// Anything other than a `.Field.Path` lookup
    #[error("unsupported template action '{0}'")]
    Unsupported(String),
}

/// Result type alias for essh operations
pub type Result<T> = std::result::Result<T, EsshError>;

impl From<std::io::Error> for EsshError {
    fn from(err: std::io::Error) -> Self {
        EsshError::Io(err.to_string())
    }
}

impl From<mlua::Error> for EsshError {
    /// Recover an `EsshError` raised by a builder from the runtime error
    /// chain; anything else is kept as a plain Lua error.
    fn from(err: mlua::Error) -> Self {
        match find_essh_error(&err) {
            Some(inner) => inner.clone(),
            None => EsshError::Lua(err),
        }
    }
}

// Convenient error constructors
impl EsshError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a loader error for `module`
    pub fn loader(module: impl Into<String>, reason: impl ToString) -> Self {
        Self::Loader {
            module: module.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a settings error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap this error so it can be raised inside the Lua runtime.
    pub fn into_lua(self) -> mlua::Error {
        mlua::Error::external(self)
    }
}

/// Walk a runtime error chain looking for an `EsshError` raised from Rust.
pub fn find_essh_error(err: &mlua::Error) -> Option<&EsshError> {
    match err {
        mlua::Error::ExternalError(inner) => inner.downcast_ref::<EsshError>(),
        mlua::Error::CallbackError { cause, .. } => find_essh_error(cause),
        mlua::Error::WithContext { cause, .. } => find_essh_error(cause),
        _ => None,
    }
}
