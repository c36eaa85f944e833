//! Small shared types used across the pipe, its stages and the observer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one side of the pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    Source,
    Sink,
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageId::Source => write!(f, "source"),
            StageId::Sink => write!(f, "sink"),
        }
    }
}

/// Result of the most recent handoff attempt from source to sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferResult {
    Accepted,
    Rejected,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Source ended, sink finished.
    Completed,
    /// The source raised a production error; the sink finished on what it had.
    SourceFailed,
    /// The sink raised a consumption error.
    SinkFailed,
}

impl Outcome {
    pub fn is_success(self) -> bool {
        self == Outcome::Completed
    }
}
