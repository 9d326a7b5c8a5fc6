//! Configuration migrations.
//!
//! A migration moves a JSON configuration document from one semantic version
//! to the next. Migrations are registered into a [`MigrationEngine`] keyed by
//! their source version; the engine walks from the document's version to the
//! current one and applies every step or none of them.

mod builtin;
mod engine;
pub mod utils;

use aethelon_domain::{SemanticVersion, VersionError};
use serde_json::Value;
use thiserror::Error;

pub use builtin::{builtin_migrations, AddModuleValidation, RenameDebugAddLegacySwitch};
pub use engine::{MigrationEngine, MigrationResult, PlannedMigration};

/// Lowest allowed priority value
pub const MIN_PRIORITY: u8 = 0;
/// Highest allowed priority value
pub const MAX_PRIORITY: u8 = 100;
/// Priority used when a migration does not choose one
pub const DEFAULT_PRIORITY: u8 = 50;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Invalid config version '{value}': {source}")]
    InvalidVersion {
        value: String,
        #[source]
        source: VersionError,
    },

    #[error("Config version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        found: SemanticVersion,
        supported: SemanticVersion,
    },

    #[error("No migration path from version {version}")]
    NoMigrationPath { version: SemanticVersion },

    #[error("Circular migration dependency detected at version {version}")]
    CircularDependency { version: SemanticVersion },

    #[error("Migration '{id}' is already registered")]
    DuplicateMigration { id: String },

    #[error("Migration '{migration}' ({from} -> {to}) precondition failed")]
    PreconditionFailed {
        migration: String,
        from: SemanticVersion,
        to: SemanticVersion,
    },

    #[error("Migration '{migration}' ({from} -> {to}) failed: {reason}")]
    StepFailed {
        migration: String,
        from: SemanticVersion,
        to: SemanticVersion,
        reason: String,
    },

    #[error("Migration '{migration}' ({from} -> {to}) produced an invalid document")]
    ValidationFailed {
        migration: String,
        from: SemanticVersion,
        to: SemanticVersion,
    },

    #[error("Configuration document must be a JSON object")]
    NotAnObject,
}

impl MigrationError {
    /// Identity of the migration that failed, if the error came from a step
    pub fn migration_id(&self) -> Option<&str> {
        match self {
            Self::PreconditionFailed { migration, .. }
            | Self::StepFailed { migration, .. }
            | Self::ValidationFailed { migration, .. } => Some(migration),
            _ => None,
        }
    }
}

// =============================================================================
// Descriptor & Contract
// =============================================================================

/// One edge in the version migration graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationDescriptor {
    pub from_version: SemanticVersion,
    pub to_version: SemanticVersion,
    pub description: String,
    /// 0-100, lower runs first when several migrations share a source version
    pub priority: u8,
    pub reversible: bool,
}

impl MigrationDescriptor {
    pub fn new(
        from_version: SemanticVersion,
        to_version: SemanticVersion,
        description: impl Into<String>,
    ) -> Self {
        Self {
            from_version,
            to_version,
            description: description.into(),
            priority: DEFAULT_PRIORITY,
            reversible: false,
        }
    }

    /// Set the priority, clamped to 0-100
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(MIN_PRIORITY, MAX_PRIORITY);
        self
    }

    pub fn reversible(mut self) -> Self {
        self.reversible = true;
        self
    }
}

/// A single configuration migration step.
///
/// `migrate` mutates the document in place. The engine stamps the target
/// version and history after each step, so implementations only touch the
/// fields they own.
pub trait ConfigMigration: Send + Sync {
    /// Stable identity, recorded in the document's migration history
    fn id(&self) -> &str;

    fn descriptor(&self) -> MigrationDescriptor;

    /// Precondition checked before `migrate`. Defaults to "the document is at
    /// this migration's source version".
    fn can_migrate(&self, doc: &Value) -> bool {
        utils::document_version(doc)
            .map(|version| version == self.descriptor().from_version)
            .unwrap_or(false)
    }

    fn migrate(&self, doc: &mut Value) -> anyhow::Result<()>;

    /// Postcondition checked after `migrate`
    fn validate_migration(&self, _doc: &Value) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_priority_is_clamped() {
        let desc = MigrationDescriptor::new(
            SemanticVersion::new(1, 0, 0),
            SemanticVersion::new(1, 1, 0),
            "x",
        )
        .with_priority(250);
        assert_eq!(desc.priority, MAX_PRIORITY);
        assert!(!desc.reversible);
    }

    #[test]
    fn test_error_carries_migration_identity() {
        let err = MigrationError::StepFailed {
            migration: "add_thing".into(),
            from: SemanticVersion::new(1, 0, 0),
            to: SemanticVersion::new(1, 1, 0),
            reason: "boom".into(),
        };
        assert_eq!(err.migration_id(), Some("add_thing"));
        assert_eq!(
            err.to_string(),
            "Migration 'add_thing' (1.0.0 -> 1.1.0) failed: boom"
        );
    }
}
