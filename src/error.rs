//! Error handling for backpressure-viz
//!
//! This module defines the crate-level error type and a Result alias.
//! Stage errors and runner failures live in [`crate::pipeline::error`].

use crate::pipeline::error::PipelineError;
use thiserror::Error;

/// Main error type for backpressure-viz operations
#[derive(Error, Debug)]
pub enum BackpressureError {
    /// Errors related to configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Errors while driving the pipe
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<BackpressureError>,
    },
}

impl BackpressureError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        BackpressureError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Result type alias for backpressure-viz operations
pub type Result<T> = std::result::Result<T, BackpressureError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<BackpressureError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
