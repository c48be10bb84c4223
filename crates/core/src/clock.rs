//! Time source used by the ticket store.

use chrono::{DateTime, Utc};

/// Source of the current instant.
///
/// The sequence year, SLA breach checks and lifecycle timestamps all read
/// from this, so tests can pin or advance time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
