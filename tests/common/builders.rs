//! Test data builders for creating test objects

use backpressure_viz::pipeline::{FlowController, LetterChunks, Sink, Source};
use backpressure_viz::PipeConfig;

/// Builder for pipe configurations, starting from the defaults
pub struct ConfigBuilder {
    config: PipeConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: PipeConfig::default(),
        }
    }

    pub fn capacities(mut self, source: usize, sink: usize) -> Self {
        self.config.source_capacity_bytes = source;
        self.config.sink_capacity_bytes = sink;
        self
    }

    pub fn chunks(mut self, total: u64, size: usize) -> Self {
        self.config.total_chunks_to_produce = total;
        self.config.chunk_size_bytes = size;
        self
    }

    pub fn latency_ms(mut self, production: u64, consumption: u64) -> Self {
        self.config.production_latency_ms = production;
        self.config.consumption_latency_ms = consumption;
        self
    }

    pub fn production_error_at(mut self, generation: u64) -> Self {
        self.config.faults.production_error_at = Some(generation);
        self
    }

    pub fn consumption_error_at(mut self, write: u64) -> Self {
        self.config.faults.consumption_error_at = Some(write);
        self
    }

    pub fn build(self) -> PipeConfig {
        self.config
    }

    /// Controller over the default stages, for runtime-free tests
    pub fn controller(self) -> FlowController<Source, Sink> {
        let c = self.config;
        let source = Source::new(
            c.source_capacity_bytes,
            c.total_chunks_to_produce,
            Box::new(LetterChunks::new(c.chunk_size_bytes)),
        )
        .with_failure_at(c.faults.production_error_at);
        let sink = Sink::new(c.sink_capacity_bytes).with_failure_at(c.faults.consumption_error_at);
        FlowController::new(source, sink)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .capacities(50, 75)
            .chunks(4, 25)
            .consumption_error_at(2)
            .build();

        assert_eq!(config.source_capacity_bytes, 50);
        assert_eq!(config.sink_capacity_bytes, 75);
        assert_eq!(config.total_chunks_to_produce, 4);
        assert_eq!(config.faults.consumption_error_at, Some(2));
        assert!(config.validate().is_ok());
    }
}
