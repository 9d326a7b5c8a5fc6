//! Application composition.
//!
//! Everything is constructed here and handed down explicitly: the settings
//! are loaded (and migrated) once, wrapped in an `Arc`, registered as a
//! service and given to the module loader.

use std::path::PathBuf;
use std::sync::Arc;

use aethelon_domain::{AethelonSettings, RuntimeSide};
use thiserror::Error;

use crate::infrastructure::config_store::{
    resolve_config_dir, ConfigSource, ConfigStore, LoadedConfig,
};
use crate::infrastructure::ports::ClockPort;
use crate::migration::MigrationError;
use crate::modules::{EnhancedModuleLoader, LoadReport, ModuleError, ModuleRegistry, ServiceRegistry};

/// Environment variable selecting the runtime side (`client` or `server`)
pub const RUNTIME_ENV: &str = "AETHELON_RUNTIME";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Failed to set up config migrations: {0}")]
    Migration(#[from] MigrationError),

    #[error("Failed to register modules: {0}")]
    Module(#[from] ModuleError),
}

/// Startup parameters.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub config_dir: PathBuf,
    pub runtime: RuntimeSide,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let runtime = match std::env::var(RUNTIME_ENV).as_deref() {
            Ok("server") | Ok("dedicated_server") => RuntimeSide::DedicatedServer,
            _ => RuntimeSide::Client,
        };
        Self {
            config_dir: resolve_config_dir(),
            runtime,
        }
    }
}

/// Main application state.
pub struct App {
    pub settings: Arc<AethelonSettings>,
    pub config: ConfigStore,
    pub config_source: ConfigSource,
    pub services: Arc<ServiceRegistry>,
    pub modules: EnhancedModuleLoader,
}

impl App {
    pub fn new(config: AppConfig, clock: Arc<dyn ClockPort>) -> Result<Self, AppError> {
        let store = ConfigStore::open(&config.config_dir, clock)?;

        let loaded = match store.load_or_default() {
            Ok(loaded) => loaded,
            Err(e) => {
                // The file is left as it was so a fixed build can retry.
                tracing::error!(
                    error = %e,
                    path = %store.path().display(),
                    "Config migration failed, continuing with default settings"
                );
                LoadedConfig::defaults(ConfigSource::FallbackDefault)
            }
        };
        if let Some(migration) = loaded.migration.as_ref().filter(|m| m.migration_performed) {
            tracing::info!(
                from = %migration.from_version,
                to = %migration.to_version,
                applied = ?migration.applied_migrations,
                "Configuration migrated"
            );
        }

        let settings = Arc::new(loaded.settings);
        let services = Arc::new(ServiceRegistry::new());
        services.register(settings.clone());

        let modules = EnhancedModuleLoader::new(
            ModuleRegistry::with_builtin()?,
            settings.clone(),
            config.runtime,
            services.clone(),
        );

        Ok(Self {
            settings,
            config: store,
            config_source: loaded.source,
            services,
            modules,
        })
    }

    pub fn start(&mut self) -> &LoadReport {
        self.modules.load_modules()
    }

    /// Returns the number of modules that failed to shut down.
    pub fn shutdown(&mut self) -> usize {
        self.modules.shutdown_modules()
    }
}
