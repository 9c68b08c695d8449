//! Clock abstraction, injectable so timing-sensitive code (the trigger loop,
//! permission timeouts) is deterministic under test.

use chrono::{DateTime, Utc};

/// Provides the current wall-clock time. Inject this rather than calling
/// `Utc::now()` directly so schedule-fire tests can control time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The default [`Clock`], backed by the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_returns_plausible_timestamp() {
        let now = SystemClock.now();
        assert!(now.timestamp() > 1_577_836_800); // after 2020-01-01
    }
}
