//! Migrations shipped with the engine.

use aethelon_domain::SemanticVersion;
use serde_json::{json, Value};

use super::{utils, ConfigMigration, MigrationDescriptor};

/// Every shipped migration, oldest first
pub fn builtin_migrations() -> Vec<Box<dyn ConfigMigration>> {
    vec![
        Box::new(AddModuleValidation),
        Box::new(RenameDebugAddLegacySwitch),
    ]
}

/// 0.9.0 -> 1.0.0: introduce the module validation toggle.
pub struct AddModuleValidation;

impl ConfigMigration for AddModuleValidation {
    fn id(&self) -> &str {
        "add_module_validation"
    }

    fn descriptor(&self) -> MigrationDescriptor {
        MigrationDescriptor::new(
            SemanticVersion::new(0, 9, 0),
            SemanticVersion::new(1, 0, 0),
            "Add enableModuleValidation toggle",
        )
        .reversible()
    }

    fn migrate(&self, doc: &mut Value) -> anyhow::Result<()> {
        utils::add_field_if_missing(doc, "enableModuleValidation", json!(true));
        Ok(())
    }

    fn validate_migration(&self, doc: &Value) -> bool {
        doc.get("enableModuleValidation")
            .is_some_and(Value::is_boolean)
    }
}

/// 1.0.0 -> 1.1.0: `enableDebugLogging` becomes `debugMode`, and the legacy
/// module switch appears (off by default).
pub struct RenameDebugAddLegacySwitch;

impl ConfigMigration for RenameDebugAddLegacySwitch {
    fn id(&self) -> &str {
        "rename_debug_add_legacy_switch"
    }

    fn descriptor(&self) -> MigrationDescriptor {
        MigrationDescriptor::new(
            SemanticVersion::new(1, 0, 0),
            SemanticVersion::new(1, 1, 0),
            "Rename enableDebugLogging to debugMode and add forceLegacyModules",
        )
    }

    fn migrate(&self, doc: &mut Value) -> anyhow::Result<()> {
        if doc.get("debugMode").is_some() {
            utils::remove_field(doc, "enableDebugLogging");
        } else {
            utils::rename_field(doc, "enableDebugLogging", "debugMode");
        }
        utils::add_field_if_missing(doc, "forceLegacyModules", json!(false));
        Ok(())
    }

    fn validate_migration(&self, doc: &Value) -> bool {
        doc.get("enableDebugLogging").is_none()
            && doc
                .get("forceLegacyModules")
                .is_some_and(Value::is_boolean)
    }
}
