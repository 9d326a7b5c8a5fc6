//! Module lifecycle contract.
//!
//! Two capability sets exist. Plain modules manage themselves through
//! `initialize`/`shutdown`. Injectable modules receive a [`ServiceRegistry`]
//! and declare the services they need. [`ModuleInstance`] carries one or the
//! other, and every call site matches on it exhaustively.

use std::fmt;

use aethelon_domain::DiScope;

use super::error::ModuleError;
use super::services::{ServiceKey, ServiceRegistry};

/// Self-managed module using the original static-access style.
pub trait AethelonModule: Send {
    /// Last-chance opt out, checked right after construction
    fn is_enabled(&self) -> bool {
        true
    }

    fn initialize(&mut self) -> anyhow::Result<()>;

    fn shutdown(&mut self) -> anyhow::Result<()>;
}

/// Module whose collaborators come from the service registry.
pub trait InjectableModule: Send {
    fn is_enabled(&self) -> bool {
        true
    }

    fn required_services(&self) -> Vec<ServiceKey>;

    fn di_scope(&self) -> DiScope {
        DiScope::Singleton
    }

    /// True only if every required service is registered.
    fn validate_dependencies(&self, services: &ServiceRegistry) -> bool {
        self.required_services()
            .iter()
            .all(|key| services.is_service_registered(key))
    }

    fn initialize_with_di(&mut self, services: &ServiceRegistry) -> anyhow::Result<()>;

    fn shutdown_with_di(&mut self, services: &ServiceRegistry) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Plain,
    Injectable,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Plain => write!(f, "plain"),
            ModuleKind::Injectable => write!(f, "injectable"),
        }
    }
}

/// A constructed module.
pub enum ModuleInstance {
    Plain(Box<dyn AethelonModule>),
    Injectable(Box<dyn InjectableModule>),
}

/// How a loader drives module lifecycles.
pub enum Lifecycle<'a> {
    /// Plain calls only; injectable modules are refused
    Plain,
    Injected {
        services: &'a ServiceRegistry,
        validate_dependencies: bool,
    },
}

impl ModuleInstance {
    pub fn plain<M: AethelonModule + 'static>(module: M) -> Self {
        Self::Plain(Box::new(module))
    }

    pub fn injectable<M: InjectableModule + 'static>(module: M) -> Self {
        Self::Injectable(Box::new(module))
    }

    pub fn kind(&self) -> ModuleKind {
        match self {
            Self::Plain(_) => ModuleKind::Plain,
            Self::Injectable(_) => ModuleKind::Injectable,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Plain(module) => module.is_enabled(),
            Self::Injectable(module) => module.is_enabled(),
        }
    }

    /// Service scope of an injectable module; plain modules have none.
    pub fn di_scope(&self) -> Option<DiScope> {
        match self {
            Self::Plain(_) => None,
            Self::Injectable(module) => Some(module.di_scope()),
        }
    }

    /// Plain initialization. Injectable modules fail loudly rather than
    /// silently skipping their setup.
    pub fn initialize_plain(&mut self, id: &str) -> Result<(), ModuleError> {
        match self {
            Self::Plain(module) => module
                .initialize()
                .map_err(|e| ModuleError::initialization(id, e)),
            Self::Injectable(_) => Err(ModuleError::UnsupportedOperation {
                module: id.to_string(),
                operation: "initialize",
            }),
        }
    }

    pub fn shutdown_plain(&mut self, id: &str) -> Result<(), ModuleError> {
        match self {
            Self::Plain(module) => module.shutdown().map_err(|e| ModuleError::shutdown(id, e)),
            Self::Injectable(_) => Err(ModuleError::UnsupportedOperation {
                module: id.to_string(),
                operation: "shutdown",
            }),
        }
    }

    pub fn initialize_with(
        &mut self,
        id: &str,
        services: &ServiceRegistry,
        validate_dependencies: bool,
    ) -> Result<(), ModuleError> {
        match self {
            Self::Plain(module) => module
                .initialize()
                .map_err(|e| ModuleError::initialization(id, e)),
            Self::Injectable(module) => {
                if validate_dependencies && !module.validate_dependencies(services) {
                    let missing = module
                        .required_services()
                        .into_iter()
                        .filter(|key| !services.is_service_registered(key))
                        .map(|key| key.name().to_string())
                        .collect();
                    return Err(ModuleError::MissingServices {
                        module: id.to_string(),
                        missing,
                    });
                }
                tracing::debug!(module = %id, scope = ?module.di_scope(), "Injecting services");
                module
                    .initialize_with_di(services)
                    .map_err(|e| ModuleError::initialization(id, e))
            }
        }
    }

    pub fn shutdown_with(&mut self, id: &str, services: &ServiceRegistry) -> Result<(), ModuleError> {
        match self {
            Self::Plain(module) => module.shutdown().map_err(|e| ModuleError::shutdown(id, e)),
            Self::Injectable(module) => module
                .shutdown_with_di(services)
                .map_err(|e| ModuleError::shutdown(id, e)),
        }
    }

    pub fn initialize(&mut self, id: &str, lifecycle: &Lifecycle<'_>) -> Result<(), ModuleError> {
        match lifecycle {
            Lifecycle::Plain => self.initialize_plain(id),
            Lifecycle::Injected {
                services,
                validate_dependencies,
            } => self.initialize_with(id, services, *validate_dependencies),
        }
    }

    pub fn shutdown(&mut self, id: &str, lifecycle: &Lifecycle<'_>) -> Result<(), ModuleError> {
        match lifecycle {
            Lifecycle::Plain => self.shutdown_plain(id),
            Lifecycle::Injected { services, .. } => self.shutdown_with(id, services),
        }
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModuleInstance").field(&self.kind()).finish()
    }
}
