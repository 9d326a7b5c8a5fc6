//! Port traits for infrastructure boundaries.
//!
//! Time is the only external dependency the core cannot control directly, so
//! it is injected. Everything else is concrete types.

use chrono::{DateTime, Utc};

// =============================================================================
// Testability Ports
// =============================================================================

#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
