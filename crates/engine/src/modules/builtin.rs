//! Modules shipped with the engine.
//!
//! Gameplay lives outside this crate; these modules only carry the
//! configuration each unit needs and the services it publishes.

use std::sync::Arc;

use aethelon_domain::{AethelonSettings, ModuleDescriptor, ModuleSide, TurtleSettings};
use anyhow::Context;

use super::contract::{AethelonModule, InjectableModule, ModuleInstance};
use super::error::ModuleError;
use super::registry::ModuleRegistry;
use super::services::{ServiceKey, ServiceRegistry};

/// Turtle entity parameters published to other modules.
#[derive(Debug, Clone, PartialEq)]
pub struct TurtleEntityType {
    pub max_islands: u32,
    pub movement_speed: f64,
    pub spawn_weight: u32,
}

impl From<&TurtleSettings> for TurtleEntityType {
    fn from(turtle: &TurtleSettings) -> Self {
        Self {
            max_islands: turtle.max_islands,
            movement_speed: turtle.movement_speed,
            spawn_weight: turtle.spawn_weight,
        }
    }
}

/// Upper bound on `turtle.maxIslands`; island slots are reserved eagerly.
pub const MAX_ISLANDS: u32 = 256;

// ============================================================================
// core
// ============================================================================

/// Rejects settings the rest of the modules cannot work with.
pub struct ConfigValidationModule {
    settings: Arc<AethelonSettings>,
}

impl AethelonModule for ConfigValidationModule {
    fn initialize(&mut self) -> anyhow::Result<()> {
        let turtle = &self.settings.turtle;
        if turtle.max_islands == 0 || turtle.max_islands > MAX_ISLANDS {
            anyhow::bail!(
                "turtle.maxIslands must be between 1 and {}, got {}",
                MAX_ISLANDS,
                turtle.max_islands
            );
        }
        if !turtle.movement_speed.is_finite() || turtle.movement_speed <= 0.0 {
            anyhow::bail!(
                "turtle.movementSpeed must be a positive number, got {}",
                turtle.movement_speed
            );
        }
        tracing::info!(
            config_version = %self.settings.config_version,
            debug_mode = self.settings.debug_mode,
            "Configuration validated"
        );
        Ok(())
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

// ============================================================================
// turtle
// ============================================================================

/// Publishes [`TurtleEntityType`] into the service registry.
#[derive(Default)]
pub struct TurtleEntityModule;

impl InjectableModule for TurtleEntityModule {
    fn required_services(&self) -> Vec<ServiceKey> {
        vec![ServiceKey::of::<AethelonSettings>()]
    }

    fn initialize_with_di(&mut self, services: &ServiceRegistry) -> anyhow::Result<()> {
        let settings = services
            .get::<AethelonSettings>()
            .context("settings service is not registered")?;
        let entity = TurtleEntityType::from(&settings.turtle);
        tracing::info!(
            max_islands = entity.max_islands,
            movement_speed = entity.movement_speed,
            "Turtle entity type registered"
        );
        services.register(Arc::new(entity));
        Ok(())
    }

    fn shutdown_with_di(&mut self, services: &ServiceRegistry) -> anyhow::Result<()> {
        services.unregister::<TurtleEntityType>();
        Ok(())
    }
}

/// Static-access variant of [`TurtleEntityModule`].
pub struct LegacyTurtleEntityModule {
    settings: Arc<AethelonSettings>,
    entity: Option<TurtleEntityType>,
}

impl LegacyTurtleEntityModule {
    pub fn entity(&self) -> Option<&TurtleEntityType> {
        self.entity.as_ref()
    }
}

impl AethelonModule for LegacyTurtleEntityModule {
    fn initialize(&mut self) -> anyhow::Result<()> {
        self.entity = Some(TurtleEntityType::from(&self.settings.turtle));
        Ok(())
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        self.entity = None;
        Ok(())
    }
}

pub struct TurtleIslandsModule {
    max_islands: u32,
    slots: Vec<u32>,
}

impl AethelonModule for TurtleIslandsModule {
    fn initialize(&mut self) -> anyhow::Result<()> {
        self.slots = (0..self.max_islands).collect();
        tracing::debug!(slots = self.slots.len(), "Island slots reserved");
        Ok(())
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        self.slots.clear();
        Ok(())
    }
}

pub struct TurtleSpawningModule {
    spawn_weight: u32,
}

impl AethelonModule for TurtleSpawningModule {
    /// A zero spawn weight turns spawning off without touching the toggles.
    fn is_enabled(&self) -> bool {
        self.spawn_weight > 0
    }

    fn initialize(&mut self) -> anyhow::Result<()> {
        tracing::debug!(spawn_weight = self.spawn_weight, "Turtle spawning configured");
        Ok(())
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

// ============================================================================
// client
// ============================================================================

#[derive(Default)]
pub struct RenderingModule;

impl AethelonModule for RenderingModule {
    fn initialize(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Register every shipped module.
pub fn register_builtin_modules(registry: &mut ModuleRegistry) -> Result<(), ModuleError> {
    registry.register(
        ModuleDescriptor::new("core.config_validation")?.with_priority(0),
        |ctx| {
            Ok(ModuleInstance::plain(ConfigValidationModule {
                settings: ctx.settings.clone(),
            }))
        },
    )?;

    registry.register(
        ModuleDescriptor::new("turtle.entity")?.with_dependencies(["core.config_validation"]),
        |_| Ok(ModuleInstance::injectable(TurtleEntityModule)),
    )?;
    registry.register(
        ModuleDescriptor::new("turtle.entity_legacy")?
            .with_dependencies(["core.config_validation"]),
        |ctx| {
            Ok(ModuleInstance::plain(LegacyTurtleEntityModule {
                settings: ctx.settings.clone(),
                entity: None,
            }))
        },
    )?;
    registry.register(
        ModuleDescriptor::new("turtle.islands")?.with_dependencies(["turtle.entity"]),
        |ctx| {
            Ok(ModuleInstance::plain(TurtleIslandsModule {
                max_islands: ctx.settings.turtle.max_islands,
                slots: Vec::new(),
            }))
        },
    )?;
    registry.register(
        ModuleDescriptor::new("turtle.spawning")?
            .with_dependencies(["turtle.entity"])
            .with_hot_reload(true),
        |ctx| {
            Ok(ModuleInstance::plain(TurtleSpawningModule {
                spawn_weight: ctx.settings.turtle.spawn_weight,
            }))
        },
    )?;

    registry.register(
        ModuleDescriptor::new("client.rendering")?
            .with_dependencies(["turtle.entity"])
            .with_side(ModuleSide::Client),
        |_| Ok(ModuleInstance::plain(RenderingModule)),
    )?;

    Ok(())
}

impl ModuleRegistry {
    /// Registry holding the shipped modules.
    pub fn with_builtin() -> Result<Self, ModuleError> {
        let mut registry = Self::new();
        register_builtin_modules(&mut registry)?;
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::enhanced::EnhancedModuleLoader;
    use crate::modules::loader::{ModuleLoader, SkipReason};
    use aethelon_domain::RuntimeSide;

    fn loader(settings: AethelonSettings, runtime: RuntimeSide) -> EnhancedModuleLoader {
        let settings = Arc::new(settings);
        let services = Arc::new(ServiceRegistry::new());
        services.register(settings.clone());
        EnhancedModuleLoader::new(
            ModuleRegistry::with_builtin().unwrap(),
            settings,
            runtime,
            services,
        )
    }

    #[test]
    fn test_builtin_registry_contents() {
        let registry = ModuleRegistry::with_builtin().unwrap();
        assert_eq!(registry.len(), 6);
        assert!(registry.contains("turtle.entity_legacy"));
        assert!(registry.descriptor("turtle.spawning").unwrap().supports_hot_reload);
    }

    #[test]
    fn test_default_client_startup() {
        let mut loader = loader(AethelonSettings::default(), RuntimeSide::Client);
        let report = loader.load_modules().clone();

        assert!(report.is_clean());
        assert_eq!(
            report.loaded,
            vec![
                "core.config_validation",
                "turtle.entity",
                "client.rendering",
                "turtle.islands",
                "turtle.spawning",
            ]
        );
        let entity = loader.services().get::<TurtleEntityType>().unwrap();
        assert_eq!(entity.max_islands, 4);

        assert_eq!(loader.shutdown_modules(), 0);
        assert!(!loader.services().is_registered::<TurtleEntityType>());
    }

    #[test]
    fn test_dedicated_server_skips_rendering() {
        let mut loader = loader(AethelonSettings::default(), RuntimeSide::DedicatedServer);
        let report = loader.load_modules();
        assert_eq!(report.skip_reason("client.rendering"), Some(SkipReason::WrongSide));
        assert_eq!(report.loaded.len(), 4);
    }

    #[test]
    fn test_forced_legacy_entity() {
        let settings = AethelonSettings {
            force_legacy_modules: true,
            ..AethelonSettings::default()
        };
        let mut loader = loader(settings, RuntimeSide::Client);
        let report = loader.load_modules().clone();
        assert!(report.loaded.contains(&"turtle.entity_legacy".to_string()));
        assert!(report.loaded.contains(&"turtle.islands".to_string()));
        assert!(!loader.services().is_registered::<TurtleEntityType>());
    }

    #[test]
    fn test_invalid_tuning_blocks_everything_downstream() {
        let mut settings = AethelonSettings::default();
        settings.turtle.max_islands = 0;
        let mut loader = loader(settings, RuntimeSide::Client);
        let report = loader.load_modules().clone();

        assert!(report.loaded.is_empty());
        assert_eq!(report.failed[0].id, "core.config_validation");
        assert_eq!(report.blocked.len(), 4);
    }

    #[test]
    fn test_oversized_island_count_rejected_before_reservation() {
        let mut settings = AethelonSettings::default();
        settings.turtle.max_islands = u32::MAX;
        let mut oversized = loader(settings, RuntimeSide::Client);
        let report = oversized.load_modules().clone();

        assert!(report.loaded.is_empty());
        assert_eq!(report.failed[0].id, "core.config_validation");
        assert!(report.failed[0].error.contains("maxIslands"));
        assert!(report.blocked.iter().any(|b| b.id == "turtle.islands"));

        let mut settings = AethelonSettings::default();
        settings.turtle.max_islands = MAX_ISLANDS;
        let mut at_limit = loader(settings, RuntimeSide::Client);
        assert!(at_limit.load_modules().is_clean());
    }

    #[test]
    fn test_zero_spawn_weight_disables_spawning() {
        let mut settings = AethelonSettings::default();
        settings.turtle.spawn_weight = 0;
        let mut loader = loader(settings, RuntimeSide::Client);
        let report = loader.load_modules();
        assert_eq!(
            report.skip_reason("turtle.spawning"),
            Some(SkipReason::SelfDisabled)
        );
    }

    #[test]
    fn test_spawning_hot_reload() {
        let mut loader = loader(AethelonSettings::default(), RuntimeSide::Client);
        loader.load_modules();
        loader.reload_module("turtle.spawning").unwrap();
        assert!(loader.is_module_loaded("turtle.spawning"));
    }

    #[test]
    fn test_plain_loader_runs_builtin_set_with_legacy_entity() {
        let mut loader = ModuleLoader::new(
            ModuleRegistry::with_builtin().unwrap(),
            Arc::new(AethelonSettings::default()),
            RuntimeSide::Client,
        );
        let report = loader.load_modules().clone();
        assert!(report.is_clean());
        assert!(report.loaded.contains(&"turtle.entity_legacy".to_string()));
    }
}
