//! Boundary between the pipe runner and whoever observes it.
//!
//! The runner publishes a `PipeSnapshot` after every step through a `watch`
//! channel and pushes timestamped `PipeEvent`s into a bounded crossbeam
//! channel. `PipeHandle` is the observer side: it reads snapshots, drains
//! events and can inject stage errors. Nothing here can drive a transfer.

use crate::pipeline::error::StreamError;
use crate::pipeline::nodes::{SinkState, SourceState};
use crate::types::{StageId, TransferResult};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Read-only view of the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSnapshot {
    pub state: SourceState,
    pub buffered_bytes: usize,
    pub buffered_chunks: Vec<u64>,
    pub capacity_bytes: usize,
    /// Chunk refused by the full buffer and waiting for room.
    pub held: Option<u64>,
    pub generation_count: u64,
    pub total_chunks: u64,
    /// A generation is in flight.
    pub generating: bool,
    pub unpiped: bool,
}

/// Read-only view of the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkSnapshot {
    pub state: SinkState,
    pub queued_bytes: usize,
    pub queued_chunks: Vec<u64>,
    pub in_flight: Option<u64>,
    /// Queued bytes plus the in-flight chunk.
    pub occupied_bytes: usize,
    pub capacity_bytes: usize,
    pub total_processed: u64,
    pub input_ended: bool,
}

/// Complete state of the pipe at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipeSnapshot {
    pub elapsed: Duration,
    pub linked: bool,
    pub last_transfer: Option<TransferResult>,
    pub source: SourceSnapshot,
    pub sink: SinkSnapshot,
}

/// Lifecycle and flow-control events exposed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipeEvent {
    /// Source stopped producing because its buffer is full.
    Suspend {
        source_buffered: usize,
        sink_occupied: usize,
    },
    /// Source resumed after the pipe made room.
    Resume,
    /// Sink accepted a chunk.
    Transfer { seq: u64 },
    /// Sink finished processing a chunk.
    Processed { seq: u64 },
    /// Sink went from full to not-full.
    Drain,
    /// Source exhausted and drained.
    End,
    /// Sink processed everything after the source ended.
    Finish,
    /// A stage raised an error.
    Error { stage: StageId, message: String },
    /// The link was severed by `severed_by`.
    Unpipe { severed_by: StageId },
    /// Chunks dropped by a stage after an error or unpipe.
    Discarded { stage: StageId, chunks: u64 },
}

impl PipeEvent {
    pub fn error(err: &StreamError) -> Self {
        PipeEvent::Error {
            stage: err.origin(),
            message: err.to_string(),
        }
    }

    /// Short lowercase name, as rendered in the event log.
    pub fn name(&self) -> &'static str {
        match self {
            PipeEvent::Suspend { .. } => "suspend",
            PipeEvent::Resume => "resume",
            PipeEvent::Transfer { .. } => "transfer",
            PipeEvent::Processed { .. } => "processed",
            PipeEvent::Drain => "drain",
            PipeEvent::End => "end",
            PipeEvent::Finish => "finish",
            PipeEvent::Error { .. } => "error",
            PipeEvent::Unpipe { .. } => "unpipe",
            PipeEvent::Discarded { .. } => "discarded",
        }
    }
}

/// An event with the time it happened, relative to the start of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimedEvent {
    pub at: Duration,
    #[serde(flatten)]
    pub event: PipeEvent,
}

/// Commands from the observer side to the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipeCommand {
    /// Raise a production error on the source.
    RaiseSourceError(String),
    /// Raise a consumption error on the sink.
    RaiseSinkError(String),
}

/// Channel capacity for events (runner → observer).
const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Observer-side handle on a running pipe.
pub struct PipeHandle {
    cmd_tx: mpsc::UnboundedSender<PipeCommand>,
    snapshot_rx: watch::Receiver<PipeSnapshot>,
    event_rx: Receiver<TimedEvent>,
}

/// Runner-side ends of the bridge.
pub(crate) struct RunnerChannels {
    pub cmd_rx: mpsc::UnboundedReceiver<PipeCommand>,
    pub snapshot_tx: watch::Sender<PipeSnapshot>,
    pub event_tx: Sender<TimedEvent>,
}

impl PipeHandle {
    pub(crate) fn new(initial: PipeSnapshot) -> (Self, RunnerChannels) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);
        let (event_tx, event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        (
            Self {
                cmd_tx,
                snapshot_rx,
                event_rx,
            },
            RunnerChannels {
                cmd_rx,
                snapshot_tx,
                event_tx,
            },
        )
    }

    /// Latest published state.
    pub fn snapshot(&self) -> PipeSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Drain all pending events.
    pub fn drain_events(&self) -> Vec<TimedEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Receiver for observers that prefer to select on events directly.
    pub fn events(&self) -> &Receiver<TimedEvent> {
        &self.event_rx
    }

    /// Returns false once the runner has exited.
    pub fn send_command(&self, cmd: PipeCommand) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }

    pub fn raise_source_error(&self, message: impl Into<String>) -> bool {
        self.send_command(PipeCommand::RaiseSourceError(message.into()))
    }

    pub fn raise_sink_error(&self, message: impl Into<String>) -> bool {
        self.send_command(PipeCommand::RaiseSinkError(message.into()))
    }

    /// Whether the runner has dropped its side of the bridge.
    pub fn is_closed(&self) -> bool {
        self.cmd_tx.is_closed()
    }
}
