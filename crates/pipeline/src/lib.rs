//! # Pipeline
//!
//! Controller of the decode → map → post-process → insert pipeline.
//!
//! - bounded in-flight work: file replays pause the decoder, live feeds drop
//!   chunks
//! - strictly serialized inserts in source order
//! - cooperative stop that waits for running jobs and the active insert
//!
//! ## Usage
//!
//! ```ignore
//! use pipeline::PipelineController;
//!
//! let mut controller = PipelineController::new(run_config);
//! controller.start_configured(sink).await?;
//! let outcome = controller.wait().await?;
//! ```

mod controller;
mod decode;
mod error;
mod metrics;
mod run;

pub use controller::PipelineController;
pub use error::PipelineError;
pub use metrics::{ControllerMetrics, ControllerMetricsSnapshot};
