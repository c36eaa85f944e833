//! Pipe-specific error types.

use crate::types::StageId;
use thiserror::Error;

/// Errors raised by a stage. Terminal for the stage that raised them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("Production error on generation {generation}: {message}")]
    Production { generation: u64, message: String },

    #[error("Consumption error on write {write}: {message}")]
    Consumption { write: u64, message: String },
}

impl StreamError {
    /// The stage this error originates from.
    pub fn origin(&self) -> StageId {
        match self {
            StreamError::Production { .. } => StageId::Source,
            StreamError::Consumption { .. } => StageId::Sink,
        }
    }
}

/// Errors that can occur while driving the pipe.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Pipe stalled: {0}")]
    Stalled(String),

    #[error("Command channel closed")]
    CommandChannelClosed,

    #[error("Runner task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin() {
        let e = StreamError::Production {
            generation: 3,
            message: "boom".into(),
        };
        assert_eq!(e.origin(), StageId::Source);
        assert_eq!(e.to_string(), "Production error on generation 3: boom");

        let e = StreamError::Consumption {
            write: 7,
            message: "disk".into(),
        };
        assert_eq!(e.origin(), StageId::Sink);
    }
}
