//! Typed service registry consumed by dependency-injected modules.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

/// Identifies a service by its concrete type.
#[derive(Debug, Clone, Copy)]
pub struct ServiceKey {
    id: TypeId,
    name: &'static str,
}

impl ServiceKey {
    pub fn of<T: Any + Send + Sync>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

type ServiceMap = HashMap<ServiceKey, Arc<dyn Any + Send + Sync>>;

/// Service container. One lock guards the whole map; loading is
/// single-threaded so contention is not a concern.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<ServiceMap>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the instance for `T`. Returns true if a previous
    /// instance was replaced.
    pub fn register<T: Any + Send + Sync>(&self, service: Arc<T>) -> bool {
        let key = ServiceKey::of::<T>();
        let replaced = self
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, service)
            .is_some();
        tracing::debug!(service = %key, replaced, "Registered service");
        replaced
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&ServiceKey::of::<T>())
            .cloned()
            .and_then(|service| service.downcast::<T>().ok())
    }

    /// Existing instance for `T`, or one created by `init` and registered.
    ///
    /// `init` runs with no lock held, so it may use the registry itself. If
    /// another caller registers `T` in the meantime, the first stored instance
    /// wins and is returned.
    pub fn get_or_init<T, F>(&self, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        if let Some(existing) = self.get::<T>() {
            return existing;
        }

        let created = Arc::new(init());
        let key = ServiceKey::of::<T>();
        let stored = self
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert_with(|| created.clone())
            .clone();
        match stored.downcast::<T>() {
            Ok(stored) => {
                if Arc::ptr_eq(&stored, &created) {
                    tracing::debug!(service = %key, "Lazily created service");
                }
                stored
            }
            Err(_) => created,
        }
    }

    pub fn is_registered<T: Any + Send + Sync>(&self) -> bool {
        self.is_service_registered(&ServiceKey::of::<T>())
    }

    pub fn is_service_registered(&self, key: &ServiceKey) -> bool {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    pub fn unregister<T: Any + Send + Sync>(&self) -> bool {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&ServiceKey::of::<T>())
            .is_some()
    }

    /// Remove whatever instance is stored under `key`.
    pub fn unregister_key(&self, key: &ServiceKey) -> bool {
        let removed = self
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some();
        if removed {
            tracing::debug!(service = %key, "Unregistered service");
        }
        removed
    }

    pub fn registered_keys(&self) -> Vec<ServiceKey> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
