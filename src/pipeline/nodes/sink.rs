//! Sink: push-based consumer with a bounded input buffer.
//!
//! The chunk being processed leaves the queue but keeps its reservation:
//! occupied capacity is queued bytes plus the in-flight chunk. Backpressure
//! therefore triggers one chunk earlier than the queue length alone suggests.

use crate::pipeline::bridge::SinkSnapshot;
use crate::pipeline::buffer::BoundedBuffer;
use crate::pipeline::chunk::Chunk;
use crate::pipeline::error::StreamError;
use crate::pipeline::stage::{Completion, Consume, Stage};
use crate::types::StageId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkState {
    Idle,
    Draining,
    Finished,
    Errored,
}

pub struct Sink {
    buffer: BoundedBuffer,
    in_flight: Option<Chunk>,
    state: SinkState,
    /// Chunks taken into processing, including the current one.
    writes: u64,
    total_processed: u64,
    processed: Vec<u64>,
    input_ended: bool,
    fail_at: Option<u64>,
    discarded: u64,
    error: Option<StreamError>,
}

impl Sink {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            buffer: BoundedBuffer::new(capacity_bytes),
            in_flight: None,
            state: SinkState::Idle,
            writes: 0,
            total_processed: 0,
            processed: Vec::new(),
            input_ended: false,
            fail_at: None,
            discarded: 0,
            error: None,
        }
    }

    /// Fail the `write`-th write with a consumption error.
    pub fn with_failure_at(mut self, write: Option<u64>) -> Self {
        self.fail_at = write;
        self
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    pub fn total_processed(&self) -> u64 {
        self.total_processed
    }

    /// Sequence numbers in the order they were processed.
    pub fn processed(&self) -> &[u64] {
        &self.processed
    }

    pub fn error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    pub fn in_flight(&self) -> Option<&Chunk> {
        self.in_flight.as_ref()
    }

    pub fn input_ended(&self) -> bool {
        self.input_ended
    }
}

impl Stage for Sink {
    fn id(&self) -> StageId {
        StageId::Sink
    }

    fn buffer(&self) -> &BoundedBuffer {
        &self.buffer
    }

    fn is_terminal(&self) -> bool {
        matches!(self.state, SinkState::Finished | SinkState::Errored)
    }

    fn discarded(&self) -> u64 {
        self.discarded
    }

    fn raise_error(&mut self, message: String) -> Option<StreamError> {
        if self.is_terminal() {
            return None;
        }
        let err = StreamError::Consumption {
            write: self.writes,
            message,
        };
        let dropped = self.buffer.clear() + usize::from(self.in_flight.take().is_some());
        self.discarded += dropped as u64;
        self.state = SinkState::Errored;
        self.error = Some(err.clone());
        tracing::warn!(dropped, "sink errored: {}", err);
        Some(err)
    }
}

impl Consume for Sink {
    fn accept(&mut self, chunk: &Chunk) -> bool {
        if self.is_terminal() || self.input_ended || self.is_full() {
            return false;
        }
        if self.occupied_bytes() + chunk.size() > self.buffer.capacity() {
            return false;
        }
        self.buffer.enqueue(chunk.clone()).is_ok()
    }

    fn occupied_bytes(&self) -> usize {
        self.buffer.len_bytes() + self.in_flight.as_ref().map_or(0, Chunk::size)
    }

    fn is_full(&self) -> bool {
        self.occupied_bytes() >= self.buffer.capacity()
    }

    fn start_next(&mut self) -> Option<u64> {
        if self.is_terminal() || self.in_flight.is_some() {
            return None;
        }
        let chunk = self.buffer.dequeue_front()?;
        let seq = chunk.seq();
        self.in_flight = Some(chunk);
        self.writes += 1;
        self.state = SinkState::Draining;
        Some(seq)
    }

    fn complete_current(&mut self) -> Completion {
        if self.state == SinkState::Errored {
            return Completion::Discarded;
        }
        let was_full = self.is_full();
        let Some(chunk) = self.in_flight.take() else {
            return Completion::Discarded;
        };

        if self.fail_at == Some(self.writes) {
            let message = format!("failed to write chunk {}", chunk.seq());
            // Put the chunk back so it is counted as discarded with the rest.
            self.in_flight = Some(chunk);
            if let Some(err) = self.raise_error(message) {
                return Completion::Failed(err);
            }
            return Completion::Discarded;
        }

        self.total_processed += 1;
        self.processed.push(chunk.seq());
        self.state = SinkState::Idle;
        Completion::Processed {
            seq: chunk.seq(),
            drained: was_full && !self.is_full(),
        }
    }

    fn end(&mut self) {
        self.input_ended = true;
    }

    fn try_finish(&mut self) -> bool {
        if self.input_ended
            && !self.is_terminal()
            && self.buffer.is_empty()
            && self.in_flight.is_none()
        {
            self.state = SinkState::Finished;
            return true;
        }
        false
    }

    fn snapshot(&self) -> SinkSnapshot {
        SinkSnapshot {
            state: self.state,
            queued_bytes: self.buffer.len_bytes(),
            queued_chunks: self.buffer.iter().map(Chunk::seq).collect(),
            in_flight: self.in_flight.as_ref().map(Chunk::seq),
            occupied_bytes: self.occupied_bytes(),
            capacity_bytes: self.buffer.capacity(),
            total_processed: self.total_processed,
            input_ended: self.input_ended,
        }
    }
}
