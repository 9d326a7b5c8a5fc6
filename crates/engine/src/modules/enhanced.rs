//! Loader for dependency-injected modules.
//!
//! Injectable variants are preferred. A `_legacy` variant only loads when
//! `forceLegacyModules` is set, in which case it replaces its injectable twin
//! and a deprecation warning is logged.

use std::sync::Arc;

use aethelon_domain::{AethelonSettings, LifecycleState, RuntimeSide};

use super::contract::Lifecycle;
use super::error::ModuleError;
use super::loader::{LoadReport, LoaderCore};
use super::registry::ModuleRegistry;
use super::services::ServiceRegistry;

pub struct EnhancedModuleLoader {
    core: LoaderCore,
    services: Arc<ServiceRegistry>,
}

impl EnhancedModuleLoader {
    pub fn new(
        registry: ModuleRegistry,
        settings: Arc<AethelonSettings>,
        runtime: RuntimeSide,
        services: Arc<ServiceRegistry>,
    ) -> Self {
        Self {
            core: LoaderCore::new(registry, settings, runtime),
            services,
        }
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn load_modules(&mut self) -> &LoadReport {
        let force_legacy = self.core.settings().force_legacy_modules;
        let (candidates, skipped) = self.core.select(force_legacy);

        for desc in candidates.iter().filter(|desc| desc.name.is_legacy()) {
            tracing::warn!(
                module = %desc.id(),
                replacement = %desc.logical_name(),
                "Loading deprecated legacy module variant because forceLegacyModules is set"
            );
        }

        let lifecycle = Lifecycle::Injected {
            services: &self.services,
            validate_dependencies: self.core.settings().enable_module_validation,
        };
        self.core.run(candidates, skipped, &lifecycle)
    }

    pub fn shutdown_modules(&mut self) -> usize {
        let lifecycle = Lifecycle::Injected {
            services: &self.services,
            validate_dependencies: false,
        };
        self.core.shutdown(&lifecycle)
    }

    pub fn reload_module(&mut self, id: &str) -> Result<(), ModuleError> {
        let lifecycle = Lifecycle::Injected {
            services: &self.services,
            validate_dependencies: self.core.settings().enable_module_validation,
        };
        self.core.reload(id, &lifecycle)
    }

    pub fn is_module_loaded(&self, id: &str) -> bool {
        self.core.is_loaded(id)
    }

    pub fn loaded_modules(&self) -> &[String] {
        self.core.load_order()
    }

    pub fn module_state(&self, id: &str) -> LifecycleState {
        self.core.state(id)
    }

    pub fn report(&self) -> &LoadReport {
        self.core.report()
    }

    pub fn registry(&self) -> &ModuleRegistry {
        self.core.registry()
    }
}
