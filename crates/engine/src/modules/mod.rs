//! Module system: lifecycle contract, factory registry, dependency
//! resolution and the two loaders.

pub mod builtin;
pub mod contract;
pub mod enhanced;
pub mod error;
pub mod loader;
pub mod registry;
pub mod resolver;
pub mod services;

pub use builtin::{register_builtin_modules, TurtleEntityType};
pub use contract::{AethelonModule, InjectableModule, Lifecycle, ModuleInstance, ModuleKind};
pub use enhanced::EnhancedModuleLoader;
pub use error::ModuleError;
pub use loader::{
    BlockedModule, FailedModule, LoadReport, ModuleLoader, SkipReason, SkippedModule,
};
pub use registry::{ModuleContext, ModuleFactory, ModuleRegistry};
pub use resolver::{resolve, Resolution, StuckModule};
pub use services::{ServiceKey, ServiceRegistry};
