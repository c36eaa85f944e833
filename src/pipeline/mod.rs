//! Two-stage flow-controlled pipe.
//!
//! Chunks flow from a bounded source buffer into a bounded sink buffer. The
//! flow controller moves them, suspends the source when downstream is
//! saturated and resumes it when the sink drains.
//!
//! # Architecture
//!
//! ```text
//! [Source] ──buffer──► FlowController ──► [Sink] ──buffer──► process
//!                            │
//!                       PipeRunner (tokio timers for latency)
//!                            │
//!                  PipeHandle (snapshots, events, commands)
//! ```
//!
//! # Design
//!
//! - **Capability traits**: `Produce` / `Consume` on top of `Stage`.
//! - **Synchronous core**: `FlowController` holds all flow-control decisions;
//!   latency is returned to the runner as `Work`.
//! - **Single writer**: only the runner task mutates the buffers.
//! - **Read-only observer**: snapshots through a `watch` channel, events
//!   through a bounded crossbeam channel.

pub mod bridge;
pub mod buffer;
pub mod chunk;
pub mod controller;
pub mod error;
pub mod executor;
pub mod nodes;
pub mod stage;

pub use bridge::{
    PipeCommand, PipeEvent, PipeHandle, PipeSnapshot, SinkSnapshot, SourceSnapshot, TimedEvent,
};
pub use buffer::BoundedBuffer;
pub use chunk::{Chunk, ChunkFactory, LetterChunks};
pub use controller::{FlowController, RunStats, Work};
pub use error::{PipelineError, PipelineResult, StreamError};
pub use executor::{PipeBuilder, PipeRunner, RunReport};
pub use nodes::{Sink, SinkState, Source, SourceState};
pub use stage::{Completion, Consume, Generation, Produce, Stage};
