//! Pipeline error types

use contracts::ContractError;
use thiserror::Error;

/// Pipeline controller errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// `start` while a run is active
    #[error("a run is already active")]
    AlreadyRunning,

    /// Control call without an active run
    #[error("no active run")]
    NotRunning,

    /// Pause or resume on a file replay
    #[error("pause and resume apply to live runs only")]
    NotLive,

    /// Run setup failed
    #[error("invalid run setup: {0}")]
    Setup(String),

    /// The decoder failed; the run was aborted
    #[error("decode failure: {0}")]
    Decode(String),

    /// The sink failed; the run was aborted
    #[error("insert failure: {0}")]
    Insert(String),

    /// A map or post-process job died
    #[error("pipeline job failed: {0}")]
    Job(String),

    /// The controller task is gone
    #[error("pipeline stopped")]
    Stopped,
}

impl From<ContractError> for PipelineError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::Decode { .. } | ContractError::Malformed { .. } => {
                PipelineError::Decode(err.to_string())
            }
            ContractError::SinkWrite { .. } | ContractError::SinkConnection { .. } => {
                PipelineError::Insert(err.to_string())
            }
            other => PipelineError::Setup(other.to_string()),
        }
    }
}
