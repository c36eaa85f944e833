//! Source: pull-based producer with its own bounded output buffer.
//!
//! One generation is outstanding at a time. The flow controller asks for the
//! next one whenever the source has room. A full buffer on its own is not
//! backpressure: the source suspends when its buffer refuses a chunk, or when
//! the controller finds the buffer still full after offering its contents to
//! the sink. It only leaves that state through `resume()`.

use crate::pipeline::bridge::SourceSnapshot;
use crate::pipeline::buffer::BoundedBuffer;
use crate::pipeline::chunk::{Chunk, ChunkFactory};
use crate::pipeline::error::StreamError;
use crate::pipeline::stage::{Generation, Produce, Stage};
use crate::types::StageId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceState {
    Idle,
    Producing,
    Suspended,
    Ended,
    Errored,
}

pub struct Source {
    buffer: BoundedBuffer,
    factory: Box<dyn ChunkFactory>,
    state: SourceState,
    total_chunks: u64,
    generation_count: u64,
    /// A generation is in flight.
    outstanding: bool,
    /// Production bound reached; `Ended` follows once the buffer drains.
    end_of_data: bool,
    /// Chunk refused by a full buffer, retried on resume.
    held: Option<Chunk>,
    unpiped: bool,
    fail_at: Option<u64>,
    suspensions: u64,
    discarded: u64,
    error: Option<StreamError>,
}

impl Source {
    pub fn new(capacity_bytes: usize, total_chunks: u64, factory: Box<dyn ChunkFactory>) -> Self {
        Self {
            buffer: BoundedBuffer::new(capacity_bytes),
            factory,
            state: SourceState::Idle,
            total_chunks,
            generation_count: 0,
            outstanding: false,
            end_of_data: false,
            held: None,
            unpiped: false,
            fail_at: None,
            suspensions: 0,
            discarded: 0,
            error: None,
        }
    }

    /// Fail generation `generation` with a production error.
    pub fn with_failure_at(mut self, generation: Option<u64>) -> Self {
        self.fail_at = generation;
        self
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn generation_count(&self) -> u64 {
        self.generation_count
    }

    /// Times the source entered `Suspended`.
    pub fn suspensions(&self) -> u64 {
        self.suspensions
    }

    pub fn error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    pub fn is_unpiped(&self) -> bool {
        self.unpiped
    }

    pub fn held(&self) -> Option<&Chunk> {
        self.held.as_ref()
    }

    fn suspend(&mut self) {
        if self.state != SourceState::Suspended {
            self.suspensions += 1;
            tracing::debug!(
                buffered = self.buffer.len_bytes(),
                capacity = self.buffer.capacity(),
                "source suspended"
            );
        }
        self.state = SourceState::Suspended;
    }
}

impl Stage for Source {
    fn id(&self) -> StageId {
        StageId::Source
    }

    fn buffer(&self) -> &BoundedBuffer {
        &self.buffer
    }

    fn is_terminal(&self) -> bool {
        matches!(self.state, SourceState::Ended | SourceState::Errored)
    }

    fn discarded(&self) -> u64 {
        self.discarded
    }

    fn raise_error(&mut self, message: String) -> Option<StreamError> {
        if self.is_terminal() {
            return None;
        }
        let err = StreamError::Production {
            generation: self.generation_count,
            message,
        };
        let abandoned = self.buffer.clear() + usize::from(self.held.take().is_some());
        self.discarded += abandoned as u64;
        self.state = SourceState::Errored;
        self.error = Some(err.clone());
        tracing::warn!(abandoned, "source errored: {}", err);
        Some(err)
    }
}

impl Produce for Source {
    fn request_next(&mut self) -> Option<u64> {
        if self.outstanding
            || self.unpiped
            || self.end_of_data
            || self.buffer.is_full()
            || !matches!(self.state, SourceState::Idle | SourceState::Producing)
        {
            return None;
        }
        self.outstanding = true;
        self.generation_count += 1;
        self.state = SourceState::Producing;
        Some(self.generation_count)
    }

    fn complete_generation(&mut self, generation: u64) -> Generation {
        self.outstanding = false;

        if self.unpiped || self.state == SourceState::Errored {
            if generation <= self.total_chunks {
                self.discarded += 1;
            }
            tracing::debug!(generation, "generation discarded");
            return Generation::Discarded { generation };
        }

        if self.fail_at == Some(generation) {
            let message = format!("failed to produce chunk {generation}");
            if let Some(err) = self.raise_error(message) {
                return Generation::Failed(err);
            }
        }

        if generation > self.total_chunks {
            self.end_of_data = true;
            tracing::debug!(generation, "source reached end of data");
            return Generation::EndOfData;
        }

        let chunk = self.factory.make(generation);
        let seq = chunk.seq();
        match self.buffer.enqueue(chunk) {
            Ok(()) => Generation::Buffered { seq },
            Err(chunk) => {
                self.held = Some(chunk);
                self.suspend();
                Generation::Rejected { seq }
            }
        }
    }

    fn suspend_if_full(&mut self) -> bool {
        if self.unpiped
            || !self.buffer.is_full()
            || !matches!(self.state, SourceState::Idle | SourceState::Producing)
        {
            return false;
        }
        self.suspend();
        true
    }

    fn resume(&mut self) -> bool {
        if self.state != SourceState::Suspended || self.unpiped {
            return false;
        }
        if let Some(chunk) = self.held.take() {
            if let Err(chunk) = self.buffer.enqueue(chunk) {
                self.held = Some(chunk);
                return false;
            }
        }
        if self.buffer.is_full() {
            return false;
        }
        self.state = SourceState::Producing;
        tracing::debug!(buffered = self.buffer.len_bytes(), "source resumed");
        true
    }

    fn unpipe(&mut self) {
        if !self.unpiped {
            tracing::info!("source unpiped");
        }
        self.unpiped = true;
    }

    fn is_suspended(&self) -> bool {
        self.state == SourceState::Suspended
    }

    fn peek(&self) -> Option<&Chunk> {
        self.buffer.front()
    }

    fn take_front(&mut self) -> Option<Chunk> {
        self.buffer.dequeue_front()
    }

    fn finish_if_drained(&mut self) -> bool {
        if self.end_of_data
            && !self.is_terminal()
            && self.buffer.is_empty()
            && self.held.is_none()
        {
            self.state = SourceState::Ended;
            return true;
        }
        false
    }

    fn snapshot(&self) -> SourceSnapshot {
        SourceSnapshot {
            state: self.state,
            buffered_bytes: self.buffer.len_bytes(),
            buffered_chunks: self.buffer.iter().map(Chunk::seq).collect(),
            capacity_bytes: self.buffer.capacity(),
            held: self.held.as_ref().map(Chunk::seq),
            generation_count: self.generation_count,
            total_chunks: self.total_chunks,
            generating: self.outstanding,
            unpiped: self.unpiped,
        }
    }
}
