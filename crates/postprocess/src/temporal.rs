//! Day-rollover reconstruction
//!
//! Records carry only a time of day. [`TemporalContext`] tracks which
//! calendar date that time belongs to across chunks: a late time followed by
//! an early time advances the date exactly once, and late stragglers that
//! arrive after the rollover are attributed to the previous date.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};

use crate::clock::time_of_day;

/// Seconds in one day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Wrap a time of day into `[0, 86400)`
pub fn wrap_tod(tod: f64) -> f64 {
    let wrapped = tod.rem_euclid(SECONDS_PER_DAY);
    // rem_euclid can round up to the modulus for tiny negative inputs
    if wrapped >= SECONDS_PER_DAY {
        0.0
    } else {
        wrapped
    }
}

/// Calendar state persisted across the chunks of one run
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalContext {
    current_date: NaiveDate,
    previous_date: NaiveDate,
    late_seen: bool,
    rollover_applied: bool,
    vicinity: f64,
}

impl TemporalContext {
    /// Start a run on `start_date`
    pub fn new(start_date: NaiveDate, vicinity: f64) -> Self {
        Self {
            current_date: start_date,
            previous_date: start_date.pred_opt().unwrap_or(start_date),
            late_seen: false,
            rollover_applied: false,
            vicinity,
        }
    }

    /// Context for a live run started at `now`.
    ///
    /// A live run started shortly after midnight treats the rollover as
    /// already applied, so late records still in transit land on yesterday.
    pub fn for_live(now: DateTime<Utc>, vicinity: f64) -> Self {
        let mut context = Self::new(now.date_naive(), vicinity);
        if time_of_day(now) < vicinity {
            context.rollover_applied = true;
        }
        context
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    pub fn previous_date(&self) -> NaiveDate {
        self.previous_date
    }

    pub fn rollover_applied(&self) -> bool {
        self.rollover_applied
    }

    pub fn late_seen(&self) -> bool {
        self.late_seen
    }

    /// Resolve the date of `tod`, advancing the state machine
    pub fn date_for(&mut self, tod: f64) -> NaiveDate {
        if tod > SECONDS_PER_DAY - self.vicinity {
            if self.rollover_applied {
                return self.previous_date;
            }
            self.late_seen = true;
            self.current_date
        } else if tod < self.vicinity {
            if self.late_seen && !self.rollover_applied {
                self.previous_date = self.current_date;
                self.current_date = self
                    .current_date
                    .checked_add_days(Days::new(1))
                    .unwrap_or(self.current_date);
                self.rollover_applied = true;
                self.late_seen = false;
            }
            self.current_date
        } else {
            self.late_seen = false;
            self.rollover_applied = false;
            self.current_date
        }
    }

    /// Absolute timestamp of `tod` in milliseconds since the Unix epoch
    pub fn timestamp_ms(&mut self, tod: f64) -> i64 {
        let date = self.date_for(tod);
        let midnight = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
        midnight + (tod * 1000.0).round() as i64
    }
}
