//! Aethelon domain types.
//!
//! Pure value objects shared by the engine: the semantic version model, module
//! descriptors and lifecycle states, and the typed configuration view.

pub mod error;
pub mod module;
pub mod settings;
pub mod version;

pub use error::DomainError;

pub use module::{
    DiScope, LifecycleState, ModuleDescriptor, ModuleName, ModuleSide, RuntimeSide,
    DEFAULT_LOAD_PRIORITY, LEGACY_SUFFIX,
};

pub use settings::{
    AethelonSettings, MigrationHistoryEntry, PhaseSettings, TurtleSettings, CONFIG_VERSION_KEY,
    CURRENT_CONFIG_VERSION, LEGACY_CONFIG_VERSION, MIGRATION_HISTORY_KEY,
};

pub use version::{compare_versions, SemanticVersion, VersionComponent, VersionError};
