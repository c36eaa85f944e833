//! Read-only observer for a running pipe.
//!
//! The observer polls [`PipeHandle`] snapshots at a fixed interval and writes
//! one frame per tick. It never sends commands on its own, so flow-control
//! decisions are unaffected by how often or how slowly it renders.

pub mod render;

use crate::error::{BackpressureError, Result};
use crate::pipeline::bridge::{PipeHandle, PipeSnapshot, TimedEvent};
use render::{render_event, render_snapshot, RenderOptions};
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// What the observer writes each tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Buffer bars followed by the events since the last frame
    #[default]
    Pretty,
    /// Events only
    Events,
    /// One JSON object per line
    Json,
}

#[derive(Serialize)]
struct JsonFrame<'a> {
    snapshot: &'a PipeSnapshot,
    events: &'a [TimedEvent],
}

pub struct Observer<W: Write> {
    handle: PipeHandle,
    interval: Duration,
    mode: OutputMode,
    options: RenderOptions,
    out: W,
    frames: u64,
}

impl<W: Write> Observer<W> {
    pub fn new(handle: PipeHandle, interval: Duration, out: W) -> Self {
        Self {
            handle,
            interval,
            mode: OutputMode::default(),
            options: RenderOptions::default(),
            out,
            frames: 0,
        }
    }

    pub fn mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn render_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn handle(&self) -> &PipeHandle {
        &self.handle
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Poll until the runner exits. The last frame is taken after the runner
    /// closed its side, so it shows the final state.
    pub async fn watch(&mut self) -> Result<u64> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let closed = self.handle.is_closed();
            self.frame()?;
            if closed {
                break;
            }
        }
        tracing::debug!(frames = self.frames, "observer stopped");
        Ok(self.frames)
    }

    /// Write one frame from the current snapshot and pending events.
    pub fn frame(&mut self) -> Result<()> {
        let snapshot = self.handle.snapshot();
        let events = self.handle.drain_events();

        match self.mode {
            OutputMode::Pretty => {
                writeln!(self.out, "{}", render_snapshot(&snapshot, self.options))?;
                for event in &events {
                    writeln!(self.out, "  {}", render_event(event, self.options))?;
                }
                writeln!(self.out)?;
            }
            OutputMode::Events => {
                for event in &events {
                    writeln!(self.out, "{}", render_event(event, self.options))?;
                }
            }
            OutputMode::Json => {
                let frame = JsonFrame {
                    snapshot: &snapshot,
                    events: &events,
                };
                serde_json::to_writer(&mut self.out, &frame)
                    .map_err(|e| BackpressureError::Serialization(e.to_string()))?;
                writeln!(self.out)?;
            }
        }
        self.out.flush()?;
        self.frames += 1;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
