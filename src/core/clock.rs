//! Time source used for lease arithmetic and schedule computation.
//!
//! Lease state is always decided against the local clock; there is no
//! authoritative server clock. Tests substitute
//! [`crate::testing::ManualClock`] to pin "now" to exact seconds.

use chrono::{DateTime, Utc};
use std::fmt;

/// A source of the current wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Truncate a timestamp to whole seconds.
pub(crate) fn truncate_to_seconds(time: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(time.timestamp(), 0).unwrap_or(time)
}
