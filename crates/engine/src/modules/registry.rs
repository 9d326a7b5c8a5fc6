//! Module factory registry.
//!
//! Maps a module id to its static descriptor and a constructor closure. The
//! resolver reads descriptors only; modules are constructed once, when they
//! are about to be initialized.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use aethelon_domain::{AethelonSettings, ModuleDescriptor, RuntimeSide};

use super::contract::ModuleInstance;
use super::error::ModuleError;

/// What a factory gets to build a module from.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub settings: Arc<AethelonSettings>,
    pub runtime: RuntimeSide,
}

impl ModuleContext {
    pub fn new(settings: Arc<AethelonSettings>, runtime: RuntimeSide) -> Self {
        Self { settings, runtime }
    }
}

pub type ModuleFactory =
    Box<dyn Fn(&ModuleContext) -> anyhow::Result<ModuleInstance> + Send + Sync>;

struct Entry {
    descriptor: ModuleDescriptor,
    factory: ModuleFactory,
}

/// Registry of constructible modules, keyed by full id.
#[derive(Default)]
pub struct ModuleRegistry {
    entries: BTreeMap<String, Entry>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module. Ids must be unique.
    pub fn register<F>(&mut self, descriptor: ModuleDescriptor, factory: F) -> Result<(), ModuleError>
    where
        F: Fn(&ModuleContext) -> anyhow::Result<ModuleInstance> + Send + Sync + 'static,
    {
        let id = descriptor.id();
        if self.entries.contains_key(&id) {
            return Err(ModuleError::Duplicate(id));
        }
        self.entries.insert(
            id,
            Entry {
                descriptor,
                factory: Box::new(factory),
            },
        );
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn descriptor(&self, id: &str) -> Option<&ModuleDescriptor> {
        self.entries.get(id).map(|entry| &entry.descriptor)
    }

    /// All descriptors, ordered by id.
    pub fn descriptors(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.entries.values().map(|entry| &entry.descriptor)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a fresh instance of `id`.
    pub fn construct(&self, id: &str, ctx: &ModuleContext) -> Result<ModuleInstance, ModuleError> {
        let entry = self
            .entries
            .get(id)
            .ok_or_else(|| ModuleError::Unknown(id.to_string()))?;
        (entry.factory)(ctx).map_err(|e| ModuleError::ConstructionFailed {
            module: id.to_string(),
            reason: format!("{:#}", e),
        })
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::contract::{AethelonModule, ModuleKind};

    struct Noop;

    impl AethelonModule for Noop {
        fn initialize(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
        fn shutdown(&mut self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn ctx() -> ModuleContext {
        ModuleContext::new(Arc::new(AethelonSettings::default()), RuntimeSide::Client)
    }

    #[test]
    fn test_register_and_construct() {
        let mut registry = ModuleRegistry::new();
        registry
            .register(ModuleDescriptor::new("core").unwrap(), |_| {
                Ok(ModuleInstance::plain(Noop))
            })
            .unwrap();

        assert!(registry.contains("core"));
        assert_eq!(registry.ids(), vec!["core"]);
        let module = registry.construct("core", &ctx()).unwrap();
        assert_eq!(module.kind(), ModuleKind::Plain);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut registry = ModuleRegistry::new();
        let desc = ModuleDescriptor::new("core").unwrap();
        registry
            .register(desc.clone(), |_| Ok(ModuleInstance::plain(Noop)))
            .unwrap();
        let err = registry
            .register(desc, |_| Ok(ModuleInstance::plain(Noop)))
            .unwrap_err();
        assert!(matches!(err, ModuleError::Duplicate(id) if id == "core"));
    }

    #[test]
    fn test_construct_failures() {
        let mut registry = ModuleRegistry::new();
        registry
            .register(ModuleDescriptor::new("turtle.islands").unwrap(), |_| {
                anyhow::bail!("island catalog missing")
            })
            .unwrap();

        assert!(matches!(
            registry.construct("nope", &ctx()),
            Err(ModuleError::Unknown(_))
        ));
        let err = registry.construct("turtle.islands", &ctx()).unwrap_err();
        assert!(err.to_string().contains("island catalog missing"));
    }
}
