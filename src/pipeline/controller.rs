//! Flow controller: the state machine between source and sink.
//!
//! The controller is synchronous. It never sleeps or spawns; stage operations
//! that need simulated latency are queued as `Work` and the runner reports
//! back through `on_generated` / `on_processed` when the latency elapses.
//! Every handoff goes through `pump()`:
//! 1. Move chunks source → sink while the sink has room (peek, accept, then
//!    dequeue).
//! 2. Suspend the source if its buffer is still full; the sink is the reason.
//! 3. Resume a suspended source and request the next generation.
//! 4. Start the sink on its next chunk if it is idle.
//! 5. Propagate end-of-stream and completion.

use crate::pipeline::bridge::{PipeEvent, PipeSnapshot};
use crate::pipeline::error::StreamError;
use crate::pipeline::stage::{Completion, Consume, Generation, Produce, Stage};
use crate::types::{Outcome, StageId, TransferResult};
use serde::Serialize;
use std::time::Duration;

/// A simulated latency the runner must wait out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Work {
    /// Production latency of the given generation.
    Generate(u64),
    /// Consumption latency of the chunk with the given sequence.
    Consume(u64),
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub generated: u64,
    pub transferred: u64,
    pub processed: u64,
    pub suspensions: u64,
    pub resumes: u64,
    pub drains: u64,
    pub discarded: u64,
    pub rejected_transfers: u64,
    pub peak_source_bytes: usize,
    pub peak_sink_bytes: usize,
}

pub struct FlowController<P: Produce, C: Consume> {
    source: P,
    sink: C,
    linked: bool,
    started: bool,
    last_transfer: Option<TransferResult>,
    outcome: Option<Outcome>,
    processed_order: Vec<u64>,
    stats: RunStats,
    events: Vec<PipeEvent>,
    work: Vec<Work>,
}

impl<P: Produce, C: Consume> FlowController<P, C> {
    pub fn new(source: P, sink: C) -> Self {
        Self {
            source,
            sink,
            linked: true,
            started: false,
            last_transfer: None,
            outcome: None,
            processed_order: Vec::new(),
            stats: RunStats::default(),
            events: Vec::new(),
            work: Vec::new(),
        }
    }

    /// Kick off the first generation. Calling it again does nothing.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        tracing::info!(
            source_capacity = self.source.buffer().capacity(),
            sink_capacity = self.sink.buffer().capacity(),
            "pipe linked"
        );
        self.pump();
        self.observe();
    }

    pub fn on_generated(&mut self, generation: u64) {
        let discarded_before = self.source.discarded();
        match self.source.complete_generation(generation) {
            Generation::Buffered { seq } => {
                self.stats.generated += 1;
                tracing::debug!(seq, "chunk generated");
                self.pump();
            }
            Generation::Rejected { seq } => {
                self.stats.generated += 1;
                tracing::debug!(seq, "source buffer refused chunk");
                self.emit_suspend();
                self.pump();
            }
            Generation::EndOfData => self.pump(),
            Generation::Failed(err) => {
                self.emit_error(&err);
                self.emit_discarded(StageId::Source, discarded_before);
                self.on_source_failed();
            }
            Generation::Discarded { .. } => {
                self.emit_discarded(StageId::Source, discarded_before);
            }
        }
        self.observe();
    }

    pub fn on_processed(&mut self) {
        let discarded_before = self.sink.discarded();
        match self.sink.complete_current() {
            Completion::Processed { seq, drained } => {
                self.stats.processed += 1;
                self.processed_order.push(seq);
                self.events.push(PipeEvent::Processed { seq });
                if drained {
                    self.stats.drains += 1;
                    self.events.push(PipeEvent::Drain);
                }
                self.pump();
            }
            Completion::Failed(err) => {
                self.emit_error(&err);
                self.emit_discarded(StageId::Sink, discarded_before);
                self.on_sink_failed();
            }
            Completion::Discarded => {}
        }
        self.observe();
    }

    /// Raise an error on one stage from outside the pipe.
    pub fn raise(&mut self, stage: StageId, message: String) {
        match stage {
            StageId::Source => {
                let discarded_before = self.source.discarded();
                if let Some(err) = self.source.raise_error(message) {
                    self.emit_error(&err);
                    self.emit_discarded(StageId::Source, discarded_before);
                    self.on_source_failed();
                }
            }
            StageId::Sink => {
                let discarded_before = self.sink.discarded();
                if let Some(err) = self.sink.raise_error(message) {
                    self.emit_error(&err);
                    self.emit_discarded(StageId::Sink, discarded_before);
                    self.on_sink_failed();
                }
            }
        }
        self.observe();
    }

    fn pump(&mut self) {
        if self.linked {
            while let Some(chunk) = self.source.peek() {
                if self.sink.is_full() {
                    break;
                }
                let seq = chunk.seq();
                if !self.sink.accept(chunk) {
                    self.last_transfer = Some(TransferResult::Rejected);
                    self.stats.rejected_transfers += 1;
                    tracing::debug!(seq, "sink rejected chunk, waiting for drain");
                    break;
                }
                self.source.take_front();
                self.last_transfer = Some(TransferResult::Accepted);
                self.stats.transferred += 1;
                self.events.push(PipeEvent::Transfer { seq });
            }

            if self.source.suspend_if_full() {
                self.emit_suspend();
            }
            if self.source.is_suspended() && self.source.resume() {
                self.stats.resumes += 1;
                self.events.push(PipeEvent::Resume);
            }
            if let Some(generation) = self.source.request_next() {
                self.work.push(Work::Generate(generation));
            }
            if self.source.finish_if_drained() {
                tracing::info!("source ended");
                self.events.push(PipeEvent::End);
                self.sink.end();
            }
        }

        if let Some(seq) = self.sink.start_next() {
            self.work.push(Work::Consume(seq));
        }
        if self.sink.try_finish() {
            tracing::info!(processed = self.stats.processed, "sink finished");
            self.events.push(PipeEvent::Finish);
            self.outcome.get_or_insert(Outcome::Completed);
            self.linked = false;
        }
    }

    /// Upstream failure: sever the link, let the sink finish what it holds.
    fn on_source_failed(&mut self) {
        self.outcome.get_or_insert(Outcome::SourceFailed);
        if self.linked {
            self.linked = false;
            tracing::info!("pipe unlinked by source error");
            self.events.push(PipeEvent::Unpipe {
                severed_by: StageId::Source,
            });
        }
        self.sink.end();
        self.pump();
    }

    /// Downstream failure: sever the link and stop the source.
    fn on_sink_failed(&mut self) {
        self.outcome.get_or_insert(Outcome::SinkFailed);
        if self.linked {
            self.linked = false;
            tracing::info!("pipe unlinked by sink error");
            self.events.push(PipeEvent::Unpipe {
                severed_by: StageId::Sink,
            });
        }
        self.source.unpipe();
    }

    fn emit_suspend(&mut self) {
        self.stats.suspensions += 1;
        self.events.push(PipeEvent::Suspend {
            source_buffered: self.source.buffer().len_bytes(),
            sink_occupied: self.sink.occupied_bytes(),
        });
    }

    fn emit_error(&mut self, err: &StreamError) {
        self.events.push(PipeEvent::error(err));
    }

    fn emit_discarded(&mut self, stage: StageId, before: u64) {
        let now = match stage {
            StageId::Source => self.source.discarded(),
            StageId::Sink => self.sink.discarded(),
        };
        let chunks = now.saturating_sub(before);
        if chunks > 0 {
            self.stats.discarded += chunks;
            self.events.push(PipeEvent::Discarded { stage, chunks });
        }
    }

    fn observe(&mut self) {
        let source_bytes = self.source.buffer().len_bytes();
        let sink_bytes = self.sink.occupied_bytes();
        debug_assert!(source_bytes <= self.source.buffer().capacity());
        debug_assert!(sink_bytes <= self.sink.buffer().capacity());
        self.stats.peak_source_bytes = self.stats.peak_source_bytes.max(source_bytes);
        self.stats.peak_sink_bytes = self.stats.peak_sink_bytes.max(sink_bytes);
    }

    /// Link severed and the sink can do nothing more.
    pub fn is_settled(&self) -> bool {
        !self.linked && self.sink.is_terminal()
    }

    pub fn is_linked(&self) -> bool {
        self.linked
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn last_transfer(&self) -> Option<TransferResult> {
        self.last_transfer
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn processed_order(&self) -> &[u64] {
        &self.processed_order
    }

    pub fn source(&self) -> &P {
        &self.source
    }

    pub fn sink(&self) -> &C {
        &self.sink
    }

    /// Latencies queued since the last call.
    pub fn take_work(&mut self) -> Vec<Work> {
        std::mem::take(&mut self.work)
    }

    /// Events emitted since the last call.
    pub fn take_events(&mut self) -> Vec<PipeEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self, elapsed: Duration) -> PipeSnapshot {
        PipeSnapshot {
            elapsed,
            linked: self.linked,
            last_transfer: self.last_transfer,
            source: self.source.snapshot(),
            sink: self.sink.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::chunk::LetterChunks;
    use crate::pipeline::nodes::{Sink, SinkState, Source, SourceState};
    use std::collections::VecDeque;

    type Controller = FlowController<Source, Sink>;

    fn controller(source_cap: usize, sink_cap: usize, total: u64) -> Controller {
        FlowController::new(
            Source::new(source_cap, total, Box::new(LetterChunks::new(25))),
            Sink::new(sink_cap),
        )
    }

    /// Completes queued work in FIFO order, optionally preferring one kind.
    /// Stops when nothing is queued.
    fn run_to_end(ctl: &mut Controller, prefer_generate: bool) -> Vec<PipeEvent> {
        let mut queue: VecDeque<Work> = VecDeque::new();
        let mut events = Vec::new();
        ctl.start();
        loop {
            queue.extend(ctl.take_work());
            events.extend(ctl.take_events());
            let next = if prefer_generate {
                queue
                    .iter()
                    .position(|w| matches!(w, Work::Generate(_)))
                    .and_then(|i| queue.remove(i))
                    .or_else(|| queue.pop_front())
            } else {
                queue.pop_front()
            };
            match next {
                Some(Work::Generate(g)) => ctl.on_generated(g),
                Some(Work::Consume(_)) => ctl.on_processed(),
                None => break,
            }
        }
        events
    }

    #[test]
    fn test_start_requests_one_generation() {
        let mut ctl = controller(100, 100, 10);
        ctl.start();
        assert_eq!(ctl.take_work(), vec![Work::Generate(1)]);
        ctl.start();
        assert!(ctl.take_work().is_empty());
    }

    #[test]
    fn test_generated_chunk_is_forwarded_immediately() {
        let mut ctl = controller(100, 100, 10);
        ctl.start();
        ctl.take_work();
        ctl.on_generated(1);
        assert_eq!(
            ctl.take_work(),
            vec![Work::Generate(2), Work::Consume(1)]
        );
        assert_eq!(ctl.take_events(), vec![PipeEvent::Transfer { seq: 1 }]);
        assert_eq!(ctl.last_transfer(), Some(TransferResult::Accepted));
        assert!(ctl.source().buffer().is_empty());
    }

    #[test]
    fn test_fast_producer_suspends_and_resumes() {
        let mut ctl = controller(100, 100, 10);
        let events = run_to_end(&mut ctl, true);

        assert!(ctl.stats().suspensions >= 1);
        assert!(ctl.stats().resumes >= 1);
        assert_eq!(ctl.outcome(), Some(Outcome::Completed));
        assert_eq!(ctl.processed_order(), (1..=10).collect::<Vec<_>>().as_slice());
        assert!(ctl.stats().peak_source_bytes <= 100);
        assert!(ctl.stats().peak_sink_bytes <= 100);

        let first_suspend = events
            .iter()
            .find(|e| matches!(e, PipeEvent::Suspend { .. }))
            .unwrap();
        assert_eq!(
            first_suspend,
            &PipeEvent::Suspend {
                source_buffered: 100,
                sink_occupied: 100
            }
        );

        let end = events.iter().position(|e| *e == PipeEvent::End).unwrap();
        let finish = events.iter().position(|e| *e == PipeEvent::Finish).unwrap();
        assert!(end < finish);
        assert_eq!(events.last(), Some(&PipeEvent::Finish));
        assert!(ctl.is_settled());
    }

    #[test]
    fn test_full_source_buffer_alone_is_not_backpressure() {
        // Each generation fills the one-chunk source buffer, but the sink
        // always takes it in the same step.
        let mut ctl = controller(25, 1000, 10);
        let events = run_to_end(&mut ctl, true);
        assert_eq!(ctl.stats().suspensions, 0);
        assert_eq!(ctl.stats().resumes, 0);
        assert!(!events.iter().any(|e| matches!(e, PipeEvent::Suspend { .. })));
        assert_eq!(ctl.outcome(), Some(Outcome::Completed));
    }

    #[test]
    fn test_slow_producer_never_suspends() {
        let mut ctl = controller(100, 100, 6);
        run_to_end(&mut ctl, false);
        assert_eq!(ctl.stats().suspensions, 0);
        assert_eq!(ctl.stats().processed, 6);
        assert_eq!(ctl.source().state(), SourceState::Ended);
        assert_eq!(ctl.sink().state(), SinkState::Finished);
    }

    #[test]
    fn test_zero_chunks_completes() {
        let mut ctl = controller(100, 100, 0);
        let events = run_to_end(&mut ctl, false);
        assert_eq!(events, vec![PipeEvent::End, PipeEvent::Finish]);
        assert_eq!(ctl.outcome(), Some(Outcome::Completed));
    }

    #[test]
    fn test_source_error_keeps_sink_running() {
        let mut ctl = controller(100, 100, 10);
        ctl.start();
        ctl.take_work();
        ctl.on_generated(1);
        ctl.on_generated(2);
        ctl.take_events();
        ctl.take_work();

        ctl.raise(StageId::Source, "boom".into());
        let events = ctl.take_events();
        assert!(matches!(events[0], PipeEvent::Error { stage: StageId::Source, .. }));
        assert!(events.contains(&PipeEvent::Unpipe {
            severed_by: StageId::Source
        }));
        assert!(!ctl.is_linked());
        assert!(!ctl.is_settled());

        // Sink processes the two chunks it already holds.
        ctl.on_processed();
        ctl.take_work();
        ctl.on_processed();
        assert!(ctl.take_events().contains(&PipeEvent::Finish));
        assert_eq!(ctl.processed_order(), &[1, 2]);
        assert_eq!(ctl.outcome(), Some(Outcome::SourceFailed));
        assert!(ctl.is_settled());
    }

    #[test]
    fn test_sink_error_unpipes_source() {
        let mut ctl = controller(100, 100, 10);
        ctl.start();
        ctl.take_work();
        ctl.on_generated(1);
        ctl.take_events();
        // Generation 2 is now in flight.
        assert_eq!(ctl.take_work(), vec![Work::Generate(2), Work::Consume(1)]);

        ctl.raise(StageId::Sink, "disk full".into());
        let events = ctl.take_events();
        assert!(events.contains(&PipeEvent::Unpipe {
            severed_by: StageId::Sink
        }));
        assert!(ctl.source().is_unpiped());
        assert!(ctl.is_settled());

        ctl.on_generated(2);
        assert!(ctl.take_work().is_empty());
        assert_eq!(
            ctl.take_events(),
            vec![PipeEvent::Discarded {
                stage: StageId::Source,
                chunks: 1
            }]
        );
        assert!(ctl.source().buffer().is_empty());
        assert_eq!(ctl.outcome(), Some(Outcome::SinkFailed));
    }

    #[test]
    fn test_second_error_does_not_unpipe_twice() {
        let mut ctl = controller(100, 100, 10);
        ctl.start();
        ctl.raise(StageId::Sink, "first".into());
        ctl.raise(StageId::Source, "second".into());
        let unpipes = ctl
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, PipeEvent::Unpipe { .. }))
            .count();
        assert_eq!(unpipes, 1);
        assert_eq!(ctl.outcome(), Some(Outcome::SinkFailed));
    }

    #[test]
    fn test_snapshot_tracks_link() {
        let mut ctl = controller(100, 100, 1);
        ctl.start();
        let snap = ctl.snapshot(Duration::from_millis(3));
        assert!(snap.linked);
        assert_eq!(snap.elapsed, Duration::from_millis(3));
        assert!(snap.source.generating);
        run_to_end(&mut ctl, false);
        assert!(!ctl.snapshot(Duration::ZERO).linked);
    }
}
