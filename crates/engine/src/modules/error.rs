//! Module loading errors.

use aethelon_domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Module '{module}' could not be constructed: {reason}")]
    ConstructionFailed { module: String, reason: String },

    #[error("Module '{module}' failed to initialize: {reason}")]
    InitializationFailed { module: String, reason: String },

    #[error("Module '{module}' failed to shut down: {reason}")]
    ShutdownFailed { module: String, reason: String },

    /// The plain lifecycle was invoked on a dependency-injected module
    #[error("Module '{module}' does not support plain {operation}(); it must be driven through the dependency-injected lifecycle")]
    UnsupportedOperation {
        module: String,
        operation: &'static str,
    },

    #[error("Module '{module}' is missing required services: {}", missing.join(", "))]
    MissingServices { module: String, missing: Vec<String> },

    #[error("Module '{module}' does not support hot reload")]
    HotReloadUnsupported { module: String },

    #[error("Module '{0}' is not loaded")]
    NotLoaded(String),

    #[error("Unknown module '{0}'")]
    Unknown(String),

    #[error("Module '{0}' is already registered")]
    Duplicate(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl ModuleError {
    pub(crate) fn initialization(module: &str, err: anyhow::Error) -> Self {
        Self::InitializationFailed {
            module: module.to_string(),
            reason: format!("{:#}", err),
        }
    }

    pub(crate) fn shutdown(module: &str, err: anyhow::Error) -> Self {
        Self::ShutdownFailed {
            module: module.to_string(),
            reason: format!("{:#}", err),
        }
    }
}
