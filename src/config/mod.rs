//! Configuration for a pipe run
//!
//! Every capacity and timing knob lives in [`PipeConfig`], which is passed
//! explicitly to the pipe builder. Configs can be written as TOML:
//!
//! ```toml
//! source_capacity_bytes = 100
//! sink_capacity_bytes = 100
//! chunk_size_bytes = 25
//! total_chunks_to_produce = 10
//! production_latency_ms = 100
//! consumption_latency_ms = 300
//! poll_interval_ms = 50
//!
//! [faults]
//! consumption_error_at = 7
//! ```
//!
//! Missing fields fall back to their defaults.

use crate::error::{BackpressureError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default capacity of each buffer in bytes
pub const DEFAULT_CAPACITY_BYTES: usize = 100;

/// Default chunk size in bytes
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 25;

/// Default number of chunks the source produces
pub const DEFAULT_TOTAL_CHUNKS: u64 = 10;

/// Default simulated production latency in milliseconds
pub const DEFAULT_PRODUCTION_LATENCY_MS: u64 = 100;

/// Default simulated consumption latency in milliseconds
pub const DEFAULT_CONSUMPTION_LATENCY_MS: u64 = 300;

/// Default observer polling interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Complete configuration of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipeConfig {
    /// Capacity of the source output buffer
    pub source_capacity_bytes: usize,

    /// Capacity of the sink input buffer, in-flight chunk included
    pub sink_capacity_bytes: usize,

    /// Size of each generated chunk
    pub chunk_size_bytes: usize,

    /// Chunks produced before end-of-data
    pub total_chunks_to_produce: u64,

    /// Simulated time to generate one chunk
    pub production_latency_ms: u64,

    /// Simulated time to process one chunk
    pub consumption_latency_ms: u64,

    /// How often the renderer samples the pipe
    pub poll_interval_ms: u64,

    /// Injected failures
    pub faults: FaultConfig,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            source_capacity_bytes: DEFAULT_CAPACITY_BYTES,
            sink_capacity_bytes: DEFAULT_CAPACITY_BYTES,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            total_chunks_to_produce: DEFAULT_TOTAL_CHUNKS,
            production_latency_ms: DEFAULT_PRODUCTION_LATENCY_MS,
            consumption_latency_ms: DEFAULT_CONSUMPTION_LATENCY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            faults: FaultConfig::default(),
        }
    }
}

/// Deterministic failure injection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Generation number whose production fails
    pub production_error_at: Option<u64>,

    /// Write number (1-based) whose consumption fails
    pub consumption_error_at: Option<u64>,
}

impl PipeConfig {
    /// Parse a TOML document and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            BackpressureError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
            .map_err(|e| e.with_context(format!("Invalid config {}", path.display())))
    }

    /// Save as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| BackpressureError::Serialization(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Reject configurations the pipe cannot make progress with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size_bytes == 0 {
            return Err(BackpressureError::Config(
                "chunk_size_bytes must be greater than zero".to_string(),
            ));
        }
        if self.source_capacity_bytes < self.chunk_size_bytes {
            return Err(BackpressureError::Config(format!(
                "source_capacity_bytes ({}) cannot hold one chunk of {} bytes",
                self.source_capacity_bytes, self.chunk_size_bytes
            )));
        }
        if self.sink_capacity_bytes < self.chunk_size_bytes {
            return Err(BackpressureError::Config(format!(
                "sink_capacity_bytes ({}) cannot hold one chunk of {} bytes",
                self.sink_capacity_bytes, self.chunk_size_bytes
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(BackpressureError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.faults.production_error_at == Some(0) || self.faults.consumption_error_at == Some(0)
        {
            return Err(BackpressureError::Config(
                "fault positions are 1-based".to_string(),
            ));
        }
        Ok(())
    }

    pub fn production_latency(&self) -> Duration {
        Duration::from_millis(self.production_latency_ms)
    }

    pub fn consumption_latency(&self) -> Duration {
        Duration::from_millis(self.consumption_latency_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Bytes the source will produce over the whole run, saturating at `u64::MAX`
    pub fn total_bytes(&self) -> u64 {
        self.total_chunks_to_produce
            .saturating_mul(self.chunk_size_bytes as u64)
    }
}
