//! # Postprocess
//!
//! Enrichment and validation of mapped chunks before insertion:
//! time offset, future-timestamp rejection, day-rollover reconstruction,
//! sensor-position projection and derived kinematics.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use postprocess::{Postprocessor, SystemClock};
//!
//! let mut postprocessor = Postprocessor::from_config(&run_config, Arc::new(SystemClock));
//! let report = postprocessor.process(&mut chunk);
//! ```

mod clock;
mod kinematics;
mod processor;
mod projection;
mod temporal;

pub use clock::{time_of_day, Clock, FixedClock, SharedClock, SystemClock};
pub use kinematics::{derive as derive_kinematics, speed_and_track};
pub use processor::{is_future, PostprocessReport, Postprocessor};
pub use projection::{ecef_to_geodetic, geodetic_to_ecef, ProjectionContext};
pub use temporal::{wrap_tod, TemporalContext, SECONDS_PER_DAY};
