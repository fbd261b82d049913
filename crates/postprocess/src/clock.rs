//! Wall-clock source
//!
//! Future-timestamp rejection and live rollover presets read the current
//! time through [`Clock`] so tests can pin it.

use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};

/// Current time provider
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Seconds since midnight UTC, with sub-second precision
pub fn time_of_day(now: DateTime<Utc>) -> f64 {
    let time = now.time();
    time.num_seconds_from_midnight() as f64 + f64::from(time.nanosecond() % 1_000_000_000) / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_of_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 1, 2, 3).unwrap()
            + chrono::Duration::milliseconds(250);
        assert_eq!(time_of_day(now), 3723.25);
    }
}
