//! Error taxonomy for the synchronization pipeline.
//!
//! Detection misses are recovered inside the confirmation loops; input and
//! persistence errors propagate to the batch runner, which skips the session.
use std::path::PathBuf;

use thiserror::Error;

use crate::detect::{Method, RecordingKind};

#[derive(Error, Debug)]
pub enum ResyncError {
    /// A detector found no qualifying artifact at or after `start_index`.
    #[error("no {method} artifact found in {recording} recording after sample {start_index}")]
    DetectionMiss {
        recording: RecordingKind,
        method: Method,
        start_index: usize,
    },

    /// Malformed or missing session metadata, or arguments that violate a
    /// detector's preconditions.
    #[error("inconsistent input: {0}")]
    InputInconsistency(String),

    /// Every candidate was rejected and no fallback remained.
    #[error("alignment ambiguous: {0}")]
    AlignmentAmbiguity(String),

    /// The parameter store or a recording could not be written.
    #[error("failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A signal violated its invariants (shape, rate, annotation range).
    #[error("invalid signal: {0}")]
    Signal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ResyncError>;

impl ResyncError {
    /// `true` for errors the confirmation loops recover from locally.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ResyncError::DetectionMiss { .. })
    }
}
