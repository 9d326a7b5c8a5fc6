//! Aethelon Engine library.
//!
//! ## Structure
//!
//! - `infrastructure/` - Config file storage, backups and the clock port
//! - `migration/` - Versioned config migrations
//! - `modules/` - Module contract, dependency resolution and loaders
//! - `app` - Application composition

pub mod app;
pub mod infrastructure;
pub mod migration;
pub mod modules;

pub use app::{App, AppConfig};
