//! Typed view of the configuration document
//!
//! The on-disk document is JSON with camelCase keys. Unknown keys are tolerated
//! and missing keys fall back to the defaults below, so a freshly migrated
//! document always deserializes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::module::ModuleName;
use crate::version::SemanticVersion;

/// Version the running code writes and migrates towards
pub const CURRENT_CONFIG_VERSION: SemanticVersion = SemanticVersion::new(1, 1, 0);

/// Version assumed for documents that predate the `configVersion` field
pub const LEGACY_CONFIG_VERSION: SemanticVersion = SemanticVersion::new(0, 9, 0);

/// Key of the version field in the JSON document
pub const CONFIG_VERSION_KEY: &str = "configVersion";

/// Key of the migration history object in the JSON document
pub const MIGRATION_HISTORY_KEY: &str = "migrationHistory";

/// All configurable settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AethelonSettings {
    #[serde(default = "default_config_version")]
    pub config_version: SemanticVersion,

    /// Run each module's dependency validation before initializing it
    #[serde(default = "default_true")]
    pub enable_module_validation: bool,

    /// Load `_legacy` module variants instead of their DI replacements
    #[serde(default)]
    pub force_legacy_modules: bool,

    #[serde(default)]
    pub debug_mode: bool,

    // ============================================================================
    // Phase & Module Toggles
    // ============================================================================
    #[serde(default = "default_phases")]
    pub phases: BTreeMap<String, PhaseSettings>,

    // ============================================================================
    // Gameplay Tuning
    // ============================================================================
    #[serde(default)]
    pub turtle: TurtleSettings,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub migration_history: BTreeMap<String, MigrationHistoryEntry>,
}

/// Coarse toggle for a phase plus per-submodule toggles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub modules: BTreeMap<String, bool>,
}

impl PhaseSettings {
    pub fn enabled_with<I: IntoIterator<Item = &'static str>>(modules: I) -> Self {
        Self {
            enabled: true,
            modules: modules.into_iter().map(|m| (m.to_string(), true)).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TurtleSettings {
    #[serde(default = "default_max_islands")]
    pub max_islands: u32,
    #[serde(default = "default_movement_speed")]
    pub movement_speed: f64,
    #[serde(default = "default_spawn_weight")]
    pub spawn_weight: u32,
}

/// One applied migration, as recorded in the document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationHistoryEntry {
    pub from: String,
    pub to: String,
    pub description: String,
    pub timestamp: String,
}

fn default_true() -> bool {
    true
}

fn default_config_version() -> SemanticVersion {
    CURRENT_CONFIG_VERSION
}

fn default_max_islands() -> u32 {
    4
}

fn default_movement_speed() -> f64 {
    0.15
}

fn default_spawn_weight() -> u32 {
    1
}

fn default_phases() -> BTreeMap<String, PhaseSettings> {
    let mut phases = BTreeMap::new();
    phases.insert(
        "core".to_string(),
        PhaseSettings::enabled_with(["config_validation"]),
    );
    phases.insert(
        "turtle".to_string(),
        PhaseSettings::enabled_with(["entity", "islands", "spawning"]),
    );
    phases.insert(
        "client".to_string(),
        PhaseSettings::enabled_with(["rendering"]),
    );
    phases
}

impl Default for TurtleSettings {
    fn default() -> Self {
        Self {
            max_islands: default_max_islands(),
            movement_speed: default_movement_speed(),
            spawn_weight: default_spawn_weight(),
        }
    }
}

impl Default for AethelonSettings {
    fn default() -> Self {
        Self {
            config_version: CURRENT_CONFIG_VERSION,
            enable_module_validation: true,
            force_legacy_modules: false,
            debug_mode: false,
            phases: default_phases(),
            turtle: TurtleSettings::default(),
            migration_history: BTreeMap::new(),
        }
    }
}

impl AethelonSettings {
    pub fn is_phase_enabled(&self, phase: &str) -> bool {
        self.phases.get(phase).is_some_and(|p| p.enabled)
    }

    /// Both gates must be open: a bare phase name needs only the phase flag,
    /// a `phase.submodule` name also needs its submodule flag. A submodule
    /// without an explicit flag is disabled.
    pub fn is_module_enabled(&self, name: &ModuleName) -> bool {
        let logical = name.logical_name();
        let phase_name = logical.split('.').next().unwrap_or(name.phase());
        let Some(phase) = self.phases.get(phase_name) else {
            return false;
        };
        if !phase.enabled {
            return false;
        }
        match name.submodule() {
            None => true,
            Some(sub) => phase.modules.get(sub).copied().unwrap_or(false),
        }
    }

    pub fn set_phase_enabled(&mut self, phase: &str, enabled: bool) {
        self.phases
            .entry(phase.to_string())
            .or_insert_with(|| PhaseSettings {
                enabled,
                modules: BTreeMap::new(),
            })
            .enabled = enabled;
    }

    pub fn set_module_enabled(&mut self, phase: &str, submodule: &str, enabled: bool) {
        self.phases
            .entry(phase.to_string())
            .or_insert_with(|| PhaseSettings {
                enabled: true,
                modules: BTreeMap::new(),
            })
            .modules
            .insert(submodule.to_string(), enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ModuleName {
        ModuleName::parse(s).unwrap()
    }

    #[test]
    fn test_defaults_enable_shipped_modules() {
        let settings = AethelonSettings::default();
        assert_eq!(settings.config_version, CURRENT_CONFIG_VERSION);
        assert!(settings.is_module_enabled(&name("turtle.entity")));
        assert!(settings.is_module_enabled(&name("core")));
    }

    #[test]
    fn test_module_needs_both_gates() {
        let mut settings = AethelonSettings::default();
        settings.set_phase_enabled("turtle", false);
        assert!(!settings.is_module_enabled(&name("turtle.entity")));
        assert!(!settings.is_module_enabled(&name("turtle")));

        settings.set_phase_enabled("turtle", true);
        settings.set_module_enabled("turtle", "entity", false);
        assert!(!settings.is_module_enabled(&name("turtle.entity")));
        assert!(settings.is_module_enabled(&name("turtle")));
    }

    #[test]
    fn test_missing_submodule_flag_is_disabled() {
        let settings = AethelonSettings::default();
        assert!(!settings.is_module_enabled(&name("turtle.weather")));
        assert!(!settings.is_module_enabled(&name("unknown.thing")));
    }

    #[test]
    fn test_legacy_variant_uses_logical_toggle() {
        let settings = AethelonSettings::default();
        assert!(settings.is_module_enabled(&name("turtle.entity_legacy")));
    }

    #[test]
    fn test_deserialize_sparse_document() {
        let json = r#"{"configVersion":"1.1.0","debugMode":true,"someFutureKey":3}"#;
        let settings: AethelonSettings = serde_json::from_str(json).unwrap();
        assert!(settings.debug_mode);
        assert!(settings.enable_module_validation);
        assert_eq!(settings.turtle, TurtleSettings::default());
        assert!(settings.phases.contains_key("core"));
    }

    #[test]
    fn test_serialize_uses_camel_case() {
        let json = serde_json::to_value(AethelonSettings::default()).unwrap();
        assert_eq!(json["configVersion"], "1.1.0");
        assert_eq!(json["forceLegacyModules"], false);
        assert_eq!(json["turtle"]["maxIslands"], 4);
        assert!(json.get("migrationHistory").is_none());
    }
}
