//! Wall-clock abstraction.
//!
//! Cooldowns, retention windows and uptime are all computed against a
//! [`Clock`] so tests can drive time explicitly with [`ManualClock`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Longest window representable without overflowing chrono's range.
const MAX_WINDOW_MS: u128 = 100 * 365 * 24 * 60 * 60 * 1000;

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Shared handle to a clock.
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Convenience constructor for the default clock.
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

/// Convert a std duration into a chrono duration, saturating at ~100 years.
pub fn to_chrono(duration: Duration) -> chrono::Duration {
    let millis = duration.as_millis().min(MAX_WINDOW_MS) as i64;
    chrono::Duration::milliseconds(millis)
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at the current system time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = *now + to_chrono(by);
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
