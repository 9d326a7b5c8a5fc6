//! Configuration storage errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::migration::MigrationError;

/// Failure while reading, writing or migrating the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Configuration migration failed: {0}")]
    Migration(#[from] MigrationError),
}

impl ConfigError {
    /// Migration failures are the only config errors that must stop the
    /// caller from trusting the file; everything else degrades to defaults.
    pub fn is_migration_failure(&self) -> bool {
        matches!(self, Self::Migration(_))
    }
}
