//! Migration registry and transactional runner.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use aethelon_domain::{MigrationHistoryEntry, SemanticVersion};
use serde_json::Value;

use super::{utils, ConfigMigration, MigrationDescriptor, MigrationError};
use crate::infrastructure::ports::ClockPort;

struct RegisteredMigration {
    descriptor: MigrationDescriptor,
    migration: Box<dyn ConfigMigration>,
    order: usize,
}

/// One hop of a computed migration path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMigration {
    pub id: String,
    pub descriptor: MigrationDescriptor,
}

/// Outcome of a successful `migrate` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationResult {
    pub migration_performed: bool,
    pub from_version: SemanticVersion,
    pub to_version: SemanticVersion,
    /// Migration ids in the order they were applied
    pub applied_migrations: Vec<String>,
}

impl MigrationResult {
    fn not_needed(version: SemanticVersion) -> Self {
        Self {
            migration_performed: false,
            from_version: version.clone(),
            to_version: version,
            applied_migrations: Vec::new(),
        }
    }
}

/// Registers migrations by source version and brings documents up to the
/// target version.
///
/// Path finding is greedy: at each version the lowest-priority migration
/// (registration order breaks ties) is taken, with no backtracking. If that
/// choice leads nowhere the run fails even when another branch would have
/// reached the target.
pub struct MigrationEngine {
    target: SemanticVersion,
    by_source: HashMap<SemanticVersion, Vec<RegisteredMigration>>,
    registered: usize,
    clock: Arc<dyn ClockPort>,
}

impl MigrationEngine {
    pub fn new(target: SemanticVersion, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            target,
            by_source: HashMap::new(),
            registered: 0,
            clock,
        }
    }

    /// Engine targeting `target` with every shipped migration registered.
    pub fn with_builtin(
        target: SemanticVersion,
        clock: Arc<dyn ClockPort>,
    ) -> Result<Self, MigrationError> {
        let mut engine = Self::new(target, clock);
        for migration in super::builtin_migrations() {
            engine.register(migration)?;
        }
        Ok(engine)
    }

    pub fn target_version(&self) -> &SemanticVersion {
        &self.target
    }

    pub fn register(&mut self, migration: Box<dyn ConfigMigration>) -> Result<(), MigrationError> {
        let id = migration.id().to_string();
        let duplicate = self
            .by_source
            .values()
            .flatten()
            .any(|m| m.migration.id() == id);
        if duplicate {
            return Err(MigrationError::DuplicateMigration { id });
        }

        let descriptor = migration.descriptor();
        tracing::debug!(
            migration = %id,
            from = %descriptor.from_version,
            to = %descriptor.to_version,
            priority = descriptor.priority,
            "Registered config migration"
        );

        let order = self.registered;
        self.registered += 1;
        let bucket = self
            .by_source
            .entry(descriptor.from_version.clone())
            .or_default();
        bucket.push(RegisteredMigration {
            descriptor,
            migration,
            order,
        });
        bucket.sort_by_key(|m| (m.descriptor.priority, m.order));
        Ok(())
    }

    /// Every registered migration, grouped by source version in ascending order
    pub fn registered_migrations(&self) -> Vec<PlannedMigration> {
        let mut sources: Vec<&SemanticVersion> = self.by_source.keys().collect();
        sources.sort();
        sources
            .into_iter()
            .flat_map(|source| &self.by_source[source])
            .map(|m| PlannedMigration {
                id: m.migration.id().to_string(),
                descriptor: m.descriptor.clone(),
            })
            .collect()
    }

    /// True when the document's version is older than the target.
    pub fn needs_migration(&self, doc: &Value) -> Result<bool, MigrationError> {
        Ok(utils::document_version(doc)? < self.target)
    }

    /// Compute the migration path from `from` to the target without applying it.
    pub fn find_migration_path(
        &self,
        from: &SemanticVersion,
    ) -> Result<Vec<PlannedMigration>, MigrationError> {
        Ok(self
            .path_from(from)?
            .into_iter()
            .map(|m| PlannedMigration {
                id: m.migration.id().to_string(),
                descriptor: m.descriptor.clone(),
            })
            .collect())
    }

    fn path_from(&self, from: &SemanticVersion) -> Result<Vec<&RegisteredMigration>, MigrationError> {
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        let mut current = from.clone();

        while current != self.target {
            if !visited.insert(current.clone()) {
                return Err(MigrationError::CircularDependency { version: current });
            }
            let step = self
                .by_source
                .get(&current)
                .and_then(|candidates| candidates.first())
                .ok_or_else(|| MigrationError::NoMigrationPath {
                    version: current.clone(),
                })?;
            path.push(step);
            current = step.descriptor.to_version.clone();
        }

        Ok(path)
    }

    /// Migrate `doc` in place to the target version.
    ///
    /// Either every step succeeds and the document ends at the target version,
    /// or the document is restored to exactly what was passed in and the
    /// failing step is reported.
    pub fn migrate(&self, doc: &mut Value) -> Result<MigrationResult, MigrationError> {
        if !doc.is_object() {
            return Err(MigrationError::NotAnObject);
        }

        let from = utils::document_version(doc)?;
        if from == self.target {
            return Ok(MigrationResult::not_needed(from));
        }
        if from > self.target {
            return Err(MigrationError::UnsupportedVersion {
                found: from,
                supported: self.target.clone(),
            });
        }

        tracing::info!(from = %from, to = %self.target, "Migrating configuration");

        let snapshot = doc.clone();
        match self.apply_path(doc, &from) {
            Ok(applied) => {
                utils::set_version(doc, &self.target);
                tracing::info!(
                    from = %from,
                    to = %self.target,
                    steps = applied.len(),
                    "Configuration migration complete"
                );
                Ok(MigrationResult {
                    migration_performed: true,
                    from_version: from,
                    to_version: self.target.clone(),
                    applied_migrations: applied,
                })
            }
            Err(e) => {
                *doc = snapshot;
                tracing::error!(error = %e, "Configuration migration failed, rolled back");
                Err(e)
            }
        }
    }

    fn apply_path(&self, doc: &mut Value, from: &SemanticVersion) -> Result<Vec<String>, MigrationError> {
        let path = self.path_from(from)?;
        let mut applied = Vec::with_capacity(path.len());

        for step in path {
            let id = step.migration.id().to_string();
            let desc = &step.descriptor;

            if !step.migration.can_migrate(doc) {
                return Err(MigrationError::PreconditionFailed {
                    migration: id,
                    from: desc.from_version.clone(),
                    to: desc.to_version.clone(),
                });
            }

            step.migration
                .migrate(doc)
                .map_err(|e| MigrationError::StepFailed {
                    migration: id.clone(),
                    from: desc.from_version.clone(),
                    to: desc.to_version.clone(),
                    reason: format!("{:#}", e),
                })?;

            if !step.migration.validate_migration(doc) {
                return Err(MigrationError::ValidationFailed {
                    migration: id,
                    from: desc.from_version.clone(),
                    to: desc.to_version.clone(),
                });
            }

            utils::set_version(doc, &desc.to_version);
            utils::record_history(
                doc,
                &id,
                &MigrationHistoryEntry {
                    from: desc.from_version.to_string(),
                    to: desc.to_version.to_string(),
                    description: desc.description.clone(),
                    timestamp: self.clock.now().to_rfc3339(),
                },
            );

            tracing::debug!(migration = %id, to = %desc.to_version, "Applied migration step");
            applied.push(id);
        }

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::ports::MockClockPort;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn v(s: &str) -> SemanticVersion {
        SemanticVersion::parse(s).unwrap()
    }

    fn clock() -> Arc<dyn ClockPort> {
        Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()))
    }

    /// Test migration that sets one field, optionally failing on demand
    struct SetField {
        id: &'static str,
        from: &'static str,
        to: &'static str,
        priority: u8,
        field: &'static str,
        fail_migrate: bool,
        fail_validation: bool,
    }

    impl SetField {
        fn new(id: &'static str, from: &'static str, to: &'static str) -> Self {
            Self {
                id,
                from,
                to,
                priority: 50,
                field: id,
                fail_migrate: false,
                fail_validation: false,
            }
        }
    }

    impl ConfigMigration for SetField {
        fn id(&self) -> &str {
            self.id
        }

        fn descriptor(&self) -> MigrationDescriptor {
            MigrationDescriptor::new(v(self.from), v(self.to), format!("set {}", self.field))
                .with_priority(self.priority)
        }

        fn migrate(&self, doc: &mut Value) -> anyhow::Result<()> {
            utils::set_field(doc, self.field, json!(true));
            if self.fail_migrate {
                anyhow::bail!("disk on fire");
            }
            Ok(())
        }

        fn validate_migration(&self, _doc: &Value) -> bool {
            !self.fail_validation
        }
    }

    #[test]
    fn test_example_scenario_adds_field_and_history() {
        let mut engine = MigrationEngine::new(v("1.0.0"), clock());
        engine
            .register(Box::new(super::super::AddModuleValidation))
            .unwrap();

        let mut doc = json!({"configVersion": "0.9.0"});
        let result = engine.migrate(&mut doc).unwrap();

        assert!(result.migration_performed);
        assert_eq!(result.applied_migrations, vec!["add_module_validation"]);
        assert_eq!(doc["configVersion"], "1.0.0");
        assert_eq!(doc["enableModuleValidation"], true);
        let entry = &doc["migrationHistory"]["add_module_validation"];
        assert_eq!(entry["from"], "0.9.0");
        assert_eq!(entry["to"], "1.0.0");
        assert_eq!(entry["timestamp"], "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_already_current_is_noop() {
        let engine = MigrationEngine::new(v("1.0.0"), clock());
        let mut doc = json!({"configVersion": "1.0.0", "x": 1});
        let before = doc.clone();

        let result = engine.migrate(&mut doc).unwrap();

        assert!(!result.migration_performed);
        assert!(result.applied_migrations.is_empty());
        assert_eq!(doc, before);
        assert!(!engine.needs_migration(&doc).unwrap());
    }

    #[test]
    fn test_missing_version_field_needs_migration() {
        let engine = MigrationEngine::new(v("1.0.0"), clock());
        assert!(engine.needs_migration(&json!({})).unwrap());
        assert!(engine
            .needs_migration(&json!({"configVersion": "garbage"}))
            .is_err());
    }

    #[test]
    fn test_multi_step_chain_applies_in_order() {
        let mut engine = MigrationEngine::new(v("1.2.0"), clock());
        engine.register(Box::new(SetField::new("b", "1.1.0", "1.2.0"))).unwrap();
        engine.register(Box::new(SetField::new("a", "1.0.0", "1.1.0"))).unwrap();

        let mut doc = json!({"configVersion": "1.0.0"});
        let result = engine.migrate(&mut doc).unwrap();

        assert_eq!(result.applied_migrations, vec!["a", "b"]);
        assert_eq!(doc["configVersion"], "1.2.0");
        assert_eq!(doc["a"], true);
        assert_eq!(doc["b"], true);
    }

    #[test]
    fn test_lowest_priority_wins_then_registration_order() {
        let mut engine = MigrationEngine::new(v("2.0.0"), clock());
        let mut slow = SetField::new("slow", "1.0.0", "2.0.0");
        slow.priority = 80;
        let mut fast = SetField::new("fast", "1.0.0", "2.0.0");
        fast.priority = 10;
        let mut tie = SetField::new("tie", "1.0.0", "2.0.0");
        tie.priority = 10;
        engine.register(Box::new(slow)).unwrap();
        engine.register(Box::new(fast)).unwrap();
        engine.register(Box::new(tie)).unwrap();

        let path = engine.find_migration_path(&v("1.0.0")).unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].id, "fast");
    }

    #[test]
    fn test_registered_migrations_listed_by_source_then_priority() {
        let mut engine = MigrationEngine::new(v("1.2.0"), clock());
        let mut late = SetField::new("late", "1.0.0", "1.1.0");
        late.priority = 90;
        engine.register(Box::new(SetField::new("second", "1.1.0", "1.2.0"))).unwrap();
        engine.register(Box::new(late)).unwrap();
        engine.register(Box::new(SetField::new("first", "1.0.0", "1.1.0"))).unwrap();

        let listed: Vec<String> = engine
            .registered_migrations()
            .into_iter()
            .map(|planned| planned.id)
            .collect();
        assert_eq!(listed, vec!["first", "late", "second"]);

        let empty = MigrationEngine::new(v("1.0.0"), clock());
        assert!(empty.registered_migrations().is_empty());
    }

    #[test]
    fn test_greedy_path_does_not_backtrack() {
        let mut engine = MigrationEngine::new(v("2.0.0"), clock());
        let mut dead_end = SetField::new("dead_end", "1.0.0", "1.5.0");
        dead_end.priority = 1;
        engine.register(Box::new(dead_end)).unwrap();
        engine.register(Box::new(SetField::new("direct", "1.0.0", "2.0.0"))).unwrap();

        let err = engine.find_migration_path(&v("1.0.0")).unwrap_err();
        assert!(matches!(err, MigrationError::NoMigrationPath { version } if version == v("1.5.0")));
    }

    #[test]
    fn test_no_outgoing_migration_is_hard_failure() {
        let engine = MigrationEngine::new(v("1.0.0"), clock());
        let mut doc = json!({"configVersion": "0.9.0"});
        let err = engine.migrate(&mut doc).unwrap_err();
        assert!(matches!(err, MigrationError::NoMigrationPath { .. }));
        assert_eq!(doc, json!({"configVersion": "0.9.0"}));
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut engine = MigrationEngine::new(v("3.0.0"), clock());
        engine.register(Box::new(SetField::new("up", "1.0.0", "2.0.0"))).unwrap();
        engine.register(Box::new(SetField::new("down", "2.0.0", "1.0.0"))).unwrap();

        let mut doc = json!({"configVersion": "1.0.0"});
        let err = engine.migrate(&mut doc).unwrap_err();
        assert!(matches!(err, MigrationError::CircularDependency { version } if version == v("1.0.0")));
    }

    #[test]
    fn test_failed_step_rolls_back_everything() {
        let mut engine = MigrationEngine::new(v("1.2.0"), clock());
        engine.register(Box::new(SetField::new("first", "1.0.0", "1.1.0"))).unwrap();
        let mut broken = SetField::new("second", "1.1.0", "1.2.0");
        broken.fail_migrate = true;
        engine.register(Box::new(broken)).unwrap();

        let mut doc = json!({"configVersion": "1.0.0", "keep": [1, 2, 3]});
        let before = serde_json::to_string(&doc).unwrap();

        let err = engine.migrate(&mut doc).unwrap_err();

        assert_eq!(err.migration_id(), Some("second"));
        assert!(err.to_string().contains("1.1.0 -> 1.2.0"));
        assert!(err.to_string().contains("disk on fire"));
        assert_eq!(serde_json::to_string(&doc).unwrap(), before);
    }

    #[test]
    fn test_failed_validation_rolls_back() {
        let mut engine = MigrationEngine::new(v("1.1.0"), clock());
        let mut invalid = SetField::new("invalid", "1.0.0", "1.1.0");
        invalid.fail_validation = true;
        engine.register(Box::new(invalid)).unwrap();

        let mut doc = json!({"configVersion": "1.0.0"});
        let err = engine.migrate(&mut doc).unwrap_err();
        assert!(matches!(err, MigrationError::ValidationFailed { .. }));
        assert!(doc.get("invalid").is_none());
        assert!(doc.get("migrationHistory").is_none());
    }

    #[test]
    fn test_precondition_failure_reported() {
        struct Refuses;
        impl ConfigMigration for Refuses {
            fn id(&self) -> &str {
                "refuses"
            }
            fn descriptor(&self) -> MigrationDescriptor {
                MigrationDescriptor::new(v("1.0.0"), v("1.1.0"), "never runs")
            }
            fn can_migrate(&self, _doc: &Value) -> bool {
                false
            }
            fn migrate(&self, _doc: &mut Value) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let mut engine = MigrationEngine::new(v("1.1.0"), clock());
        engine.register(Box::new(Refuses)).unwrap();
        let err = engine
            .migrate(&mut json!({"configVersion": "1.0.0"}))
            .unwrap_err();
        assert!(matches!(err, MigrationError::PreconditionFailed { .. }));
    }

    #[test]
    fn test_newer_document_is_refused() {
        let engine = MigrationEngine::new(v("1.0.0"), clock());
        let mut doc = json!({"configVersion": "2.0.0"});
        assert!(!engine.needs_migration(&doc).unwrap());
        assert!(matches!(
            engine.migrate(&mut doc),
            Err(MigrationError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_non_object_document_rejected() {
        let engine = MigrationEngine::new(v("1.0.0"), clock());
        assert!(matches!(
            engine.migrate(&mut json!([1, 2])),
            Err(MigrationError::NotAnObject)
        ));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut engine = MigrationEngine::new(v("1.1.0"), clock());
        engine.register(Box::new(SetField::new("a", "1.0.0", "1.1.0"))).unwrap();
        let err = engine
            .register(Box::new(SetField::new("a", "1.0.0", "1.1.0")))
            .unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateMigration { .. }));
    }

    #[test]
    fn test_history_timestamp_comes_from_clock() {
        let mut mock = MockClockPort::new();
        mock.expect_now()
            .times(1)
            .returning(|| Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap());

        let mut engine = MigrationEngine::new(v("1.1.0"), Arc::new(mock));
        engine.register(Box::new(SetField::new("a", "1.0.0", "1.1.0"))).unwrap();

        let mut doc = json!({"configVersion": "1.0.0"});
        engine.migrate(&mut doc).unwrap();
        assert_eq!(
            doc["migrationHistory"]["a"]["timestamp"],
            "2030-01-02T03:04:05+00:00"
        );
    }
}
