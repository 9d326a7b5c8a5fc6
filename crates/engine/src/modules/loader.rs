//! Dependency-ordered module loading.
//!
//! [`LoaderCore`] holds everything both loaders share: candidate selection,
//! batch-wise initialization, lifecycle state tracking, reverse-order
//! shutdown and hot reload. [`ModuleLoader`] drives it with the plain
//! lifecycle; the enhanced loader drives it with injected services.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use aethelon_domain::{
    AethelonSettings, DiScope, LifecycleState, ModuleDescriptor, RuntimeSide, LEGACY_SUFFIX,
};

use super::contract::{Lifecycle, ModuleInstance};
use super::error::ModuleError;
use super::registry::{ModuleContext, ModuleRegistry};
use super::resolver::{resolve, StuckModule};
use super::services::{ServiceKey, ServiceRegistry};

// ============================================================================
// Load Report
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Phase or submodule toggle is off
    Disabled,
    /// Not available in this runtime
    WrongSide,
    /// Legacy variant while legacy modules are not forced
    LegacyNotForced,
    /// A legacy twin of this module is loaded instead
    SupersededByLegacy,
    /// The module reported itself disabled after construction
    SelfDisabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedModule {
    pub id: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedModule {
    pub id: String,
    pub error: String,
}

/// A module that was never started because a dependency failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedModule {
    pub id: String,
    pub failed_dependencies: Vec<String>,
}

/// Outcome of the last `load_modules` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Initialized modules, in load order
    pub loaded: Vec<String>,
    pub failed: Vec<FailedModule>,
    pub blocked: Vec<BlockedModule>,
    pub stuck: Vec<StuckModule>,
    pub skipped: Vec<SkippedModule>,
}

impl LoadReport {
    /// True when every candidate module came up.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty() && self.stuck.is_empty()
    }

    pub fn skip_reason(&self, id: &str) -> Option<SkipReason> {
        self.skipped.iter().find(|s| s.id == id).map(|s| s.reason)
    }
}

// ============================================================================
// Loader Core
// ============================================================================

pub(crate) struct LoaderCore {
    registry: ModuleRegistry,
    context: ModuleContext,
    active: HashMap<String, ModuleInstance>,
    load_order: Vec<String>,
    states: HashMap<String, LifecycleState>,
    /// Services registered by per-module scoped modules, released on stop
    owned_services: HashMap<String, Vec<ServiceKey>>,
    report: LoadReport,
}

impl LoaderCore {
    pub(crate) fn new(
        registry: ModuleRegistry,
        settings: Arc<AethelonSettings>,
        runtime: RuntimeSide,
    ) -> Self {
        Self {
            registry,
            context: ModuleContext::new(settings, runtime),
            active: HashMap::new(),
            load_order: Vec::new(),
            states: HashMap::new(),
            owned_services: HashMap::new(),
            report: LoadReport::default(),
        }
    }

    pub(crate) fn settings(&self) -> &AethelonSettings {
        &self.context.settings
    }

    pub(crate) fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Split the registry into load candidates and skipped modules.
    ///
    /// With `allow_legacy`, a legacy variant replaces its injectable twin;
    /// without it, legacy variants are skipped.
    pub(crate) fn select(&self, allow_legacy: bool) -> (Vec<ModuleDescriptor>, Vec<SkippedModule>) {
        let runtime = self.context.runtime;
        let mut candidates = Vec::new();
        let mut skipped = Vec::new();

        for desc in self.registry.descriptors() {
            let id = desc.id();
            let reason = if !desc.side.is_available_on(runtime) {
                Some(SkipReason::WrongSide)
            } else if !self.context.settings.is_module_enabled(&desc.name) {
                Some(SkipReason::Disabled)
            } else if desc.name.is_legacy() && !allow_legacy {
                Some(SkipReason::LegacyNotForced)
            } else if !desc.name.is_legacy() && allow_legacy && self.has_legacy_twin(&id) {
                Some(SkipReason::SupersededByLegacy)
            } else {
                None
            };

            match reason {
                Some(reason) => {
                    tracing::debug!(module = %id, ?reason, "Skipping module");
                    skipped.push(SkippedModule { id, reason });
                }
                None => candidates.push(desc.clone()),
            }
        }

        (candidates, skipped)
    }

    fn has_legacy_twin(&self, id: &str) -> bool {
        let twin = format!("{}{}", id, LEGACY_SUFFIX);
        self.registry
            .descriptor(&twin)
            .is_some_and(|d| d.side.is_available_on(self.context.runtime))
    }

    /// Resolve and start `candidates`, batch by batch.
    pub(crate) fn run(
        &mut self,
        candidates: Vec<ModuleDescriptor>,
        skipped: Vec<SkippedModule>,
        lifecycle: &Lifecycle<'_>,
    ) -> &LoadReport {
        if !self.load_order.is_empty() {
            tracing::warn!(
                loaded = self.load_order.len(),
                "Modules are already loaded, ignoring load request"
            );
            return &self.report;
        }
        self.reset_failed();

        let mut report = LoadReport {
            skipped,
            ..LoadReport::default()
        };
        let resolution = resolve(&candidates);
        let by_id: HashMap<String, &ModuleDescriptor> =
            candidates.iter().map(|desc| (desc.id(), desc)).collect();
        // Logical names of modules that did not come up
        let mut unusable: HashSet<String> = HashSet::new();

        tracing::info!(
            candidates = candidates.len(),
            batches = resolution.batches.len(),
            "Loading modules"
        );

        for id in resolution.batches.iter().flatten() {
            let Some(desc) = by_id.get(id) else {
                continue;
            };

            let failed_dependencies: Vec<String> = desc
                .dependencies
                .iter()
                .filter(|dep| unusable.contains(*dep))
                .cloned()
                .collect();
            if !failed_dependencies.is_empty() {
                tracing::warn!(
                    module = %id,
                    dependencies = ?failed_dependencies,
                    "Not starting module because a dependency failed"
                );
                unusable.insert(desc.logical_name());
                report.blocked.push(BlockedModule {
                    id: id.clone(),
                    failed_dependencies,
                });
                continue;
            }

            match self.start(desc, lifecycle) {
                Ok(Some(instance)) => {
                    tracing::info!(module = %id, kind = %instance.kind(), "Module loaded");
                    self.active.insert(id.clone(), instance);
                    self.load_order.push(id.clone());
                    report.loaded.push(id.clone());
                }
                Ok(None) => {
                    tracing::info!(module = %id, "Module disabled itself, skipping");
                    unusable.insert(desc.logical_name());
                    report.skipped.push(SkippedModule {
                        id: id.clone(),
                        reason: SkipReason::SelfDisabled,
                    });
                }
                Err(e) => {
                    tracing::error!(module = %id, error = %e, "Module failed to load");
                    unusable.insert(desc.logical_name());
                    report.failed.push(FailedModule {
                        id: id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if !resolution.stuck.is_empty() {
            for stuck in &resolution.stuck {
                tracing::error!(
                    module = %stuck.id,
                    dependencies = ?stuck.dependencies,
                    unresolved = ?stuck.unresolved,
                    "Unresolvable module dependencies"
                );
            }
            tracing::error!(
                count = resolution.stuck.len(),
                "Circular or missing module dependencies detected, remaining modules were not loaded"
            );
        }
        report.stuck = resolution.stuck;

        tracing::info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            blocked = report.blocked.len(),
            stuck = report.stuck.len(),
            skipped = report.skipped.len(),
            "Module loading finished"
        );
        self.report = report;
        &self.report
    }

    /// Construct and initialize one module. `None` if it disabled itself.
    fn start(
        &mut self,
        desc: &ModuleDescriptor,
        lifecycle: &Lifecycle<'_>,
    ) -> Result<Option<ModuleInstance>, ModuleError> {
        let id = desc.id();
        let mut instance = match self.registry.construct(&id, &self.context) {
            Ok(instance) => instance,
            Err(e) => {
                self.advance(&id, LifecycleState::Initializing)?;
                self.advance(&id, LifecycleState::Failed)?;
                return Err(e);
            }
        };
        if !instance.is_enabled() {
            return Ok(None);
        }

        self.advance(&id, LifecycleState::Initializing)?;
        let before = scoped_snapshot(&instance, lifecycle);
        let initialized = instance.initialize(&id, lifecycle);
        if let (Some(before), Lifecycle::Injected { services, .. }) = (before, lifecycle) {
            let owned: Vec<ServiceKey> = services
                .registered_keys()
                .into_iter()
                .filter(|key| !before.contains(key))
                .collect();
            if initialized.is_err() {
                release_services(&id, services, owned);
            } else if !owned.is_empty() {
                self.owned_services.insert(id.clone(), owned);
            }
        }
        if let Err(e) = initialized {
            self.advance(&id, LifecycleState::Failed)?;
            return Err(e);
        }
        self.advance(&id, LifecycleState::Active)?;
        Ok(Some(instance))
    }

    fn stop(
        &mut self,
        id: &str,
        mut instance: ModuleInstance,
        lifecycle: &Lifecycle<'_>,
    ) -> Result<(), ModuleError> {
        self.advance(id, LifecycleState::ShuttingDown)?;
        let stopped = instance.shutdown(id, lifecycle);
        if let (Some(owned), Lifecycle::Injected { services, .. }) =
            (self.owned_services.remove(id), lifecycle)
        {
            release_services(id, services, owned);
        }
        match stopped {
            Ok(()) => self.advance(id, LifecycleState::Unloaded),
            Err(e) => {
                self.advance(id, LifecycleState::Failed)?;
                Err(e)
            }
        }
    }

    fn advance(&mut self, id: &str, next: LifecycleState) -> Result<(), ModuleError> {
        let current = self.state(id);
        let next = current.transition(next)?;
        tracing::debug!(module = %id, from = %current, to = %next, "Module state changed");
        self.states.insert(id.to_string(), next);
        Ok(())
    }

    fn reset_failed(&mut self) {
        for state in self.states.values_mut() {
            if *state == LifecycleState::Failed {
                *state = LifecycleState::Unloaded;
            }
        }
    }

    /// Shut down in exact reverse load order. Returns the number of modules
    /// whose shutdown failed; a failure never stops the others.
    pub(crate) fn shutdown(&mut self, lifecycle: &Lifecycle<'_>) -> usize {
        let order = std::mem::take(&mut self.load_order);
        let mut failures = 0;
        tracing::info!(modules = order.len(), "Shutting down modules");

        for id in order.iter().rev() {
            let Some(instance) = self.active.remove(id) else {
                continue;
            };
            match self.stop(id, instance, lifecycle) {
                Ok(()) => tracing::info!(module = %id, "Module shut down"),
                Err(e) => {
                    failures += 1;
                    tracing::error!(module = %id, error = %e, "Module failed to shut down");
                }
            }
        }

        failures
    }

    /// Shut down and re-initialize a loaded module in place.
    pub(crate) fn reload(&mut self, id: &str, lifecycle: &Lifecycle<'_>) -> Result<(), ModuleError> {
        let desc = self
            .registry
            .descriptor(id)
            .cloned()
            .ok_or_else(|| ModuleError::Unknown(id.to_string()))?;
        if !desc.supports_hot_reload {
            return Err(ModuleError::HotReloadUnsupported {
                module: id.to_string(),
            });
        }
        let instance = self
            .active
            .remove(id)
            .ok_or_else(|| ModuleError::NotLoaded(id.to_string()))?;

        tracing::info!(module = %id, "Reloading module");
        let restarted = self
            .stop(id, instance, lifecycle)
            .and_then(|()| self.start(&desc, lifecycle));

        match restarted {
            Ok(Some(instance)) => {
                self.active.insert(id.to_string(), instance);
                tracing::info!(module = %id, "Module reloaded");
                Ok(())
            }
            Ok(None) => {
                self.load_order.retain(|loaded| loaded != id);
                tracing::info!(module = %id, "Module disabled itself during reload");
                Ok(())
            }
            Err(e) => {
                self.load_order.retain(|loaded| loaded != id);
                tracing::error!(module = %id, error = %e, "Module reload failed");
                Err(e)
            }
        }
    }

    pub(crate) fn is_loaded(&self, id: &str) -> bool {
        self.active.contains_key(id)
    }

    pub(crate) fn load_order(&self) -> &[String] {
        &self.load_order
    }

    pub(crate) fn state(&self, id: &str) -> LifecycleState {
        self.states.get(id).copied().unwrap_or_default()
    }

    pub(crate) fn report(&self) -> &LoadReport {
        &self.report
    }
}

/// Keys present before a per-module scoped module initializes.
fn scoped_snapshot(
    instance: &ModuleInstance,
    lifecycle: &Lifecycle<'_>,
) -> Option<HashSet<ServiceKey>> {
    match lifecycle {
        Lifecycle::Injected { services, .. } if instance.di_scope() == Some(DiScope::PerModule) => {
            Some(services.registered_keys().into_iter().collect())
        }
        _ => None,
    }
}

fn release_services(id: &str, services: &ServiceRegistry, owned: Vec<ServiceKey>) {
    for key in owned {
        if services.unregister_key(&key) {
            tracing::debug!(module = %id, service = %key, "Released module-scoped service");
        }
    }
}

// ============================================================================
// Module Loader
// ============================================================================

/// Loader that drives every module through the plain lifecycle.
///
/// Where a logical module has both variants, the legacy one is used, since
/// injectable modules refuse plain initialization.
pub struct ModuleLoader {
    core: LoaderCore,
}

impl ModuleLoader {
    pub fn new(
        registry: ModuleRegistry,
        settings: Arc<AethelonSettings>,
        runtime: RuntimeSide,
    ) -> Self {
        Self {
            core: LoaderCore::new(registry, settings, runtime),
        }
    }

    pub fn load_modules(&mut self) -> &LoadReport {
        let (candidates, skipped) = self.core.select(true);
        self.core.run(candidates, skipped, &Lifecycle::Plain)
    }

    pub fn shutdown_modules(&mut self) -> usize {
        self.core.shutdown(&Lifecycle::Plain)
    }

    pub fn reload_module(&mut self, id: &str) -> Result<(), ModuleError> {
        self.core.reload(id, &Lifecycle::Plain)
    }

    pub fn is_module_loaded(&self, id: &str) -> bool {
        self.core.is_loaded(id)
    }

    /// Loaded module ids in load order
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
