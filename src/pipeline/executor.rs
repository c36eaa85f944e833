//! Pipe runner: drives the flow controller on a tokio runtime.
//!
//! The runner is the single coordinating task. Each loop iteration:
//! 1. Spawn a timer task for every `Work` item the controller queued.
//! 2. Publish the snapshot and forward new events to the observer.
//! 3. Stop once the controller is settled and no timer is outstanding.
//! 4. Otherwise wait for the next timer completion or observer command.
//!
//! Timer tasks only sleep and report back; they never touch stage state, so
//! every buffer mutation happens on this task.

use crate::config::PipeConfig;
use crate::error::Result;
use crate::pipeline::bridge::{
    PipeCommand, PipeHandle, PipeSnapshot, RunnerChannels, TimedEvent,
};
use crate::pipeline::chunk::{ChunkFactory, LetterChunks};
use crate::pipeline::controller::{FlowController, RunStats, Work};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::nodes::{Sink, Source};
use crate::pipeline::stage::{Consume, Produce};
use crate::types::{Outcome, StageId};
use crossbeam_channel::TrySendError;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Everything observed during one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: Outcome,
    pub duration: Duration,
    pub stats: RunStats,
    /// Sequence numbers in the order the sink processed them.
    pub processed_order: Vec<u64>,
    pub events: Vec<TimedEvent>,
    pub final_snapshot: PipeSnapshot,
}

impl RunReport {
    /// Events without timestamps, in emission order.
    pub fn event_kinds(&self) -> Vec<&'static str> {
        self.events.iter().map(|e| e.event.name()).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.iter().filter(|e| e.event.name() == name).count()
    }
}

/// Builds the default `Source`/`Sink` pair from a [`PipeConfig`].
pub struct PipeBuilder {
    config: PipeConfig,
    factory: Option<Box<dyn ChunkFactory>>,
}

impl PipeBuilder {
    pub fn new(config: PipeConfig) -> Self {
        Self {
            config,
            factory: None,
        }
    }

    /// Replace the default fixed-size letter chunks.
    pub fn chunk_factory(mut self, factory: impl ChunkFactory + 'static) -> Self {
        self.factory = Some(Box::new(factory));
        self
    }

    pub fn build(self) -> Result<(PipeRunner<Source, Sink>, PipeHandle)> {
        self.config.validate()?;
        let config = self.config;
        let factory = self
            .factory
            .unwrap_or_else(|| Box::new(LetterChunks::new(config.chunk_size_bytes)));

        let source = Source::new(
            config.source_capacity_bytes,
            config.total_chunks_to_produce,
            factory,
        )
        .with_failure_at(config.faults.production_error_at);
        let sink =
            Sink::new(config.sink_capacity_bytes).with_failure_at(config.faults.consumption_error_at);

        Ok(PipeRunner::new(
            FlowController::new(source, sink),
            config.production_latency(),
            config.consumption_latency(),
        ))
    }

    /// Build and run to completion, discarding the handle.
    pub async fn run(self) -> Result<RunReport> {
        let (runner, _handle) = self.build()?;
        Ok(runner.run().await?)
    }
}

/// Owns the controller and the runner side of the observer bridge.
pub struct PipeRunner<P: Produce, C: Consume> {
    controller: FlowController<P, C>,
    production_latency: Duration,
    consumption_latency: Duration,
    channels: RunnerChannels,
    events: Vec<TimedEvent>,
    dropped_events: u64,
}

impl<P: Produce, C: Consume> PipeRunner<P, C> {
    pub fn new(
        controller: FlowController<P, C>,
        production_latency: Duration,
        consumption_latency: Duration,
    ) -> (Self, PipeHandle) {
        let (handle, channels) = PipeHandle::new(controller.snapshot(Duration::ZERO));
        let runner = Self {
            controller,
            production_latency,
            consumption_latency,
            channels,
            events: Vec::new(),
            dropped_events: 0,
        };
        (runner, handle)
    }

    /// Drive the pipe until both ends are done.
    pub async fn run(mut self) -> PipelineResult<RunReport> {
        let start = Instant::now();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Work>();
        let mut outstanding = 0usize;

        self.controller.start();
        loop {
            for work in self.controller.take_work() {
                self.schedule(work, &done_tx);
                outstanding += 1;
            }
            self.publish(start.elapsed());

            if self.controller.is_settled() && outstanding == 0 {
                break;
            }
            if outstanding == 0 {
                return Err(PipelineError::Stalled(format!(
                    "no simulated work pending while linked={} and sink not terminal",
                    self.controller.is_linked()
                )));
            }

            tokio::select! {
                Some(work) = done_rx.recv() => {
                    outstanding -= 1;
                    match work {
                        Work::Generate(generation) => self.controller.on_generated(generation),
                        Work::Consume(seq) => {
                            tracing::trace!(seq, "consumption latency elapsed");
                            self.controller.on_processed();
                        }
                    }
                }
                Some(cmd) = self.channels.cmd_rx.recv() => self.handle_command(cmd),
                else => return Err(PipelineError::CommandChannelClosed),
            }
        }

        if self.dropped_events > 0 {
            tracing::warn!(
                "Observer dropped {} events due to backpressure",
                self.dropped_events
            );
        }

        let duration = start.elapsed();
        let outcome = self
            .controller
            .outcome()
            .ok_or_else(|| PipelineError::Stalled("settled without an outcome".to_string()))?;
        tracing::info!(?outcome, ?duration, "pipe run complete");

        Ok(RunReport {
            outcome,
            duration,
            stats: self.controller.stats().clone(),
            processed_order: self.controller.processed_order().to_vec(),
            events: self.events,
            final_snapshot: self.controller.snapshot(duration),
        })
    }

    fn handle_command(&mut self, cmd: PipeCommand) {
        tracing::debug!(?cmd, "observer command");
        match cmd {
            PipeCommand::RaiseSourceError(message) => {
                self.controller.raise(StageId::Source, message)
            }
            PipeCommand::RaiseSinkError(message) => self.controller.raise(StageId::Sink, message),
        }
    }

    fn schedule(&self, work: Work, done_tx: &mpsc::UnboundedSender<Work>) {
        let latency = match work {
            Work::Generate(_) => self.production_latency,
            Work::Consume(_) => self.consumption_latency,
        };
        let tx = done_tx.clone();
        tokio::spawn(async move {
            if latency.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(latency).await;
            }
            // The runner only drops its receiver after all work reported back.
            let _ = tx.send(work);
        });
    }

    fn publish(&mut self, elapsed: Duration) {
        self.channels
            .snapshot_tx
            .send_replace(self.controller.snapshot(elapsed));

        for event in self.controller.take_events() {
            let timed = TimedEvent { at: elapsed, event };
            match self.channels.event_tx.try_send(timed.clone()) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(_)) => self.dropped_events += 1,
            }
            self.events.push(timed);
        }
    }
}

impl<P, C> PipeRunner<P, C>
where
    P: Produce + Send + 'static,
    C: Consume + Send + 'static,
{
    /// Run on the current tokio runtime in a task of its own.
    pub fn spawn(self) -> JoinHandle<PipelineResult<RunReport>> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::bridge::PipeEvent;
    use crate::pipeline::chunk::Chunk;

    fn config(total: u64, produce_ms: u64, consume_ms: u64) -> PipeConfig {
        PipeConfig {
            total_chunks_to_produce: total,
            production_latency_ms: produce_ms,
            consumption_latency_ms: consume_ms,
            ..PipeConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_completes_in_order() {
        let report = PipeBuilder::new(config(10, 10, 30)).run().await.unwrap();
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.processed_order, (1..=10).collect::<Vec<_>>());
        assert_eq!(report.stats.generated, 10);
        assert_eq!(report.stats.transferred, 10);
        assert_eq!(report.count("end"), 1);
        assert_eq!(report.count("finish"), 1);
        assert!(!report.final_snapshot.linked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_follows_simulated_latency() {
        // Producer-bound: 3 chunks at 100ms plus the end-of-data generation.
        let report = PipeBuilder::new(config(3, 100, 1)).run().await.unwrap();
        assert!(report.duration >= Duration::from_millis(400));
        assert!(report.duration < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_factory_chunks_flow_through() {
        struct Growing;
        impl ChunkFactory for Growing {
            fn make(&mut self, seq: u64) -> Chunk {
                Chunk::filled(seq, 10 + seq as usize * 5, b'g')
            }
        }

        let report = PipeBuilder::new(config(8, 5, 20))
            .chunk_factory(Growing)
            .run()
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::Completed);
        assert_eq!(report.processed_order, (1..=8).collect::<Vec<_>>());
        assert!(report.stats.peak_source_bytes <= 100);
        assert!(report.stats.peak_sink_bytes <= 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_observes_and_injects() {
        let (runner, handle) = PipeBuilder::new(config(10, 10, 50)).build().unwrap();
        let initial = handle.snapshot();
        assert!(initial.linked);
        assert_eq!(initial.source.generation_count, 0);

        let task = runner.spawn();
        tokio::time::sleep(Duration::from_millis(65)).await;
        let mid = handle.snapshot();
        assert!(mid.linked);
        assert!(mid.sink.total_processed >= 1);

        assert!(handle.raise_sink_error("disk full"));
        let report = task.await.unwrap().unwrap();
        assert_eq!(report.outcome, Outcome::SinkFailed);

        let events = handle.drain_events();
        assert!(events.iter().any(|e| e.event
            == PipeEvent::Unpipe {
                severed_by: StageId::Sink
            }));
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let bad = PipeConfig {
            chunk_size_bytes: 0,
            ..PipeConfig::default()
        };
        assert!(PipeBuilder::new(bad).build().is_err());
    }
}
