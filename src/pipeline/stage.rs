//! Capability traits for the two ends of the pipe.
//!
//! - **`Stage`**: what both ends share: identity, a buffer to observe, and a
//!   terminal error path.
//! - **`Produce`**: the pull-based source side.
//! - **`Consume`**: the push-based sink side.
//!
//! Stage operations never schedule work themselves. They return typed signals
//! (`Generation`, `Completion`) and the flow controller decides what happens
//! next, so every cross-boundary mutation goes through one place.

use crate::pipeline::bridge::{SinkSnapshot, SourceSnapshot};
use crate::pipeline::buffer::BoundedBuffer;
use crate::pipeline::chunk::Chunk;
use crate::pipeline::error::StreamError;
use crate::types::StageId;

/// Outcome of a finished generation on the producing side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    /// Chunk enqueued.
    Buffered { seq: u64 },
    /// Buffer refused the chunk; it is held and the source is suspended.
    Rejected { seq: u64 },
    /// Production bound reached; no chunk was produced.
    EndOfData,
    /// This generation raised a production error.
    Failed(StreamError),
    /// The source was unpiped or errored while generating; result dropped.
    Discarded { generation: u64 },
}

/// Outcome of a finished write on the consuming side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Chunk processed. `drained` marks a full → not-full transition.
    Processed { seq: u64, drained: bool },
    /// This write raised a consumption error.
    Failed(StreamError),
    /// The sink errored while the write was in flight; result dropped.
    Discarded,
}

/// Shared surface of both ends.
pub trait Stage {
    fn id(&self) -> StageId;

    fn buffer(&self) -> &BoundedBuffer;

    fn is_terminal(&self) -> bool;

    /// Chunks this stage dropped after an error or unpipe.
    fn discarded(&self) -> u64;

    /// Move the stage to its errored state.
    ///
    /// Returns the raised error, or `None` if the stage was already terminal.
    fn raise_error(&mut self, message: String) -> Option<StreamError>;
}

/// The producing end.
pub trait Produce: Stage {
    /// Start one generation if production is allowed. Returns its number.
    fn request_next(&mut self) -> Option<u64>;

    /// Called when the simulated production latency of `generation` elapses.
    fn complete_generation(&mut self, generation: u64) -> Generation;

    /// Suspend if the buffer is still full after the pipe moved what the sink
    /// would take. Returns true only on the transition.
    fn suspend_if_full(&mut self) -> bool;

    /// Leave the suspended state if there is room again. No-op otherwise.
    fn resume(&mut self) -> bool;

    /// Stop honoring `request_next`; in-flight output will be discarded.
    fn unpipe(&mut self);

    fn is_suspended(&self) -> bool;

    fn peek(&self) -> Option<&Chunk>;

    fn take_front(&mut self) -> Option<Chunk>;

    /// Transition to ended once end-of-data was reached and the buffer is
    /// empty. Returns true only on the transition itself.
    fn finish_if_drained(&mut self) -> bool;

    fn snapshot(&self) -> SourceSnapshot;
}

/// The consuming end.
pub trait Consume: Stage {
    /// Hand a chunk to the sink. False when it cannot take it now.
    fn accept(&mut self, chunk: &Chunk) -> bool;

    /// Queued bytes plus the bytes of the chunk being processed.
    fn occupied_bytes(&self) -> usize;

    fn is_full(&self) -> bool;

    /// Take the head chunk into processing if idle. Returns its sequence.
    fn start_next(&mut self) -> Option<u64>;

    /// Called when the simulated consumption latency elapses.
    fn complete_current(&mut self) -> Completion;

    /// No more chunks will arrive.
    fn end(&mut self);

    /// Transition to finished once input ended and everything was processed.
    /// Returns true only on the transition itself.
    fn try_finish(&mut self) -> bool;

    fn snapshot(&self) -> SinkSnapshot;
}
