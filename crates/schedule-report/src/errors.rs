//! Run-level failure signal.
//!
//! A run either produces a complete report or one of these. Per-week errors
//! arrive here only after the retry policy has given up on them.

use batching::{ClassifyError, FailureStage, WeekKey};
use thiserror::Error;

use crate::state_machine::IllegalTransition;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A week exhausted its retry budget or hit a non-retriable error.
    #[error("week {week_key} failed at {stage} after {attempts} attempt(s): {source}")]
    WeekFailed {
        week_key: WeekKey,
        stage: FailureStage,
        attempts: u32,
        #[source]
        source: ClassifyError,
    },

    /// A worker task panicked or was aborted unexpectedly.
    #[error("classification worker did not complete: {reason}")]
    WorkerLost { reason: String },

    /// The caller cancelled the run while weeks were in flight.
    #[error("run cancelled during dispatch")]
    Cancelled,

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

impl PipelineError {
    pub fn week_failed(week_key: WeekKey, attempts: u32, source: ClassifyError) -> Self {
        Self::WeekFailed {
            week_key,
            stage: source.stage(),
            attempts,
            source,
        }
    }

    /// The week that brought the run down, if any.
    pub fn week_key(&self) -> Option<WeekKey> {
        match self {
            Self::WeekFailed { week_key, .. } => Some(*week_key),
            _ => None,
        }
    }
}
