//! Infrastructure implementations.
//!
//! File-system backed storage for the configuration and its backups, plus the
//! clock port they share.

pub mod backup;
pub mod clock;
pub mod config_store;
pub mod error;
pub mod ports;
