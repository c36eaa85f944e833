//! Text rendering of pipe snapshots and events.
//!
//! Pure functions from snapshot to string; the caller decides where the text
//! goes. Color is optional so output stays readable when piped.

use crate::pipeline::bridge::{PipeEvent, PipeSnapshot, SinkSnapshot, SourceSnapshot, TimedEvent};
use crate::pipeline::nodes::{SinkState, SourceState};
use crate::types::TransferResult;
use colored::{Color, Colorize};

/// Default width of a capacity bar in cells
pub const DEFAULT_BAR_WIDTH: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub color: bool,
    pub bar_width: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            color: true,
            bar_width: DEFAULT_BAR_WIDTH,
        }
    }
}

fn paint(text: &str, color: Color, opts: RenderOptions) -> String {
    if opts.color {
        text.color(color).to_string()
    } else {
        text.to_string()
    }
}

/// Color for a fill level: green below half, yellow below full, red at capacity.
fn fill_color(used: usize, capacity: usize) -> Color {
    if capacity == 0 || used >= capacity {
        Color::Red
    } else if used * 2 >= capacity {
        Color::Yellow
    } else {
        Color::Green
    }
}

/// `[██████░░░░]`-style bar for `used` out of `capacity`.
pub fn capacity_bar(used: usize, capacity: usize, opts: RenderOptions) -> String {
    let width = opts.bar_width.max(1);
    let filled = if capacity == 0 {
        width
    } else {
        (used.min(capacity) * width).div_ceil(capacity)
    };
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(width - filled));
    format!("[{}]", paint(&bar, fill_color(used, capacity), opts))
}

fn seq_list(seqs: &[u64]) -> String {
    seqs.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn source_state_label(state: SourceState, opts: RenderOptions) -> String {
    let (text, color) = match state {
        SourceState::Idle => ("IDLE", Color::White),
        SourceState::Producing => ("PRODUCING", Color::Green),
        SourceState::Suspended => ("SUSPENDED", Color::Yellow),
        SourceState::Ended => ("ENDED", Color::Cyan),
        SourceState::Errored => ("ERRORED", Color::Red),
    };
    paint(&format!("{text:<9}"), color, opts)
}

fn sink_state_label(state: SinkState, opts: RenderOptions) -> String {
    let (text, color) = match state {
        SinkState::Idle => ("IDLE", Color::White),
        SinkState::Draining => ("DRAINING", Color::Green),
        SinkState::Finished => ("FINISHED", Color::Cyan),
        SinkState::Errored => ("ERRORED", Color::Red),
    };
    paint(&format!("{text:<9}"), color, opts)
}

pub fn render_source(source: &SourceSnapshot, opts: RenderOptions) -> String {
    let mut line = format!(
        "source {} {} {:>4}/{:<4}B gen {}/{} [{}]",
        source_state_label(source.state, opts),
        capacity_bar(source.buffered_bytes, source.capacity_bytes, opts),
        source.buffered_bytes,
        source.capacity_bytes,
        source.generation_count.min(source.total_chunks),
        source.total_chunks,
        seq_list(&source.buffered_chunks),
    );
    if let Some(held) = source.held {
        line.push_str(&format!(" held {held}"));
    }
    if source.unpiped {
        line.push_str(&paint(" unpiped", Color::Magenta, opts));
    }
    line
}

pub fn render_sink(sink: &SinkSnapshot, opts: RenderOptions) -> String {
    let in_flight = sink
        .in_flight
        .map(|seq| format!(" >{seq}"))
        .unwrap_or_default();
    format!(
        "sink   {} {} {:>4}/{:<4}B done {} [{}]{}",
        sink_state_label(sink.state, opts),
        capacity_bar(sink.occupied_bytes, sink.capacity_bytes, opts),
        sink.occupied_bytes,
        sink.capacity_bytes,
        sink.total_processed,
        seq_list(&sink.queued_chunks),
        in_flight,
    )
}

/// Three-line frame: header, source, sink.
pub fn render_snapshot(snapshot: &PipeSnapshot, opts: RenderOptions) -> String {
    let link = if snapshot.linked {
        paint("linked", Color::Green, opts)
    } else {
        paint("unlinked", Color::Red, opts)
    };
    let last = match snapshot.last_transfer {
        Some(TransferResult::Accepted) => "accepted",
        Some(TransferResult::Rejected) => "rejected",
        None => "-",
    };
    format!(
        "t={:>6}ms pipe {} last transfer {}\n{}\n{}",
        snapshot.elapsed.as_millis(),
        link,
        last,
        render_source(&snapshot.source, opts),
        render_sink(&snapshot.sink, opts),
    )
}

pub fn render_event(event: &TimedEvent, opts: RenderOptions) -> String {
    let detail = match &event.event {
        PipeEvent::Suspend {
            source_buffered,
            sink_occupied,
        } => format!("source buffer {source_buffered}B, sink occupied {sink_occupied}B"),
        PipeEvent::Transfer { seq } | PipeEvent::Processed { seq } => format!("chunk {seq}"),
        PipeEvent::Error { stage, message } => format!("{stage}: {message}"),
        PipeEvent::Unpipe { severed_by } => format!("severed by {severed_by}"),
        PipeEvent::Discarded { stage, chunks } => format!("{stage} dropped {chunks} chunk(s)"),
        PipeEvent::Resume | PipeEvent::Drain | PipeEvent::End | PipeEvent::Finish => {
            String::new()
        }
    };
    let color = match &event.event {
        PipeEvent::Suspend { .. } | PipeEvent::Drain => Color::Yellow,
        PipeEvent::Resume | PipeEvent::End | PipeEvent::Finish => Color::Cyan,
        PipeEvent::Error { .. } | PipeEvent::Unpipe { .. } | PipeEvent::Discarded { .. } => {
            Color::Red
        }
        PipeEvent::Transfer { .. } | PipeEvent::Processed { .. } => Color::White,
    };
    let name = paint(&format!("{:<9}", event.event.name()), color, opts);
    format!("t={:>6}ms {} {}", event.at.as_millis(), name, detail)
        .trim_end()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StageId;
    use std::time::Duration;

    const PLAIN: RenderOptions = RenderOptions {
        color: false,
        bar_width: 4,
    };

    #[test]
    fn test_capacity_bar_fill() {
        assert_eq!(capacity_bar(0, 100, PLAIN), "[░░░░]");
        assert_eq!(capacity_bar(50, 100, PLAIN), "[██░░]");
        assert_eq!(capacity_bar(100, 100, PLAIN), "[████]");
        // Partial cells round up so any occupancy is visible.
        assert_eq!(capacity_bar(1, 100, PLAIN), "[█░░░]");
    }

    #[test]
    fn test_fill_color_thresholds() {
        assert_eq!(fill_color(10, 100), Color::Green);
        assert_eq!(fill_color(50, 100), Color::Yellow);
        assert_eq!(fill_color(100, 100), Color::Red);
    }

    #[test]
    fn test_render_sink_shows_in_flight() {
        let sink = SinkSnapshot {
            state: SinkState::Draining,
            queued_bytes: 50,
            queued_chunks: vec![3, 4],
            in_flight: Some(2),
            occupied_bytes: 75,
            capacity_bytes: 100,
            total_processed: 1,
            input_ended: false,
        };
        let line = render_sink(&sink, PLAIN);
        assert!(line.contains("DRAINING"));
        assert!(line.contains("75/100"));
        assert!(line.contains("[3 4] >2"));
    }

    #[test]
    fn test_render_event_plain() {
        let event = TimedEvent {
            at: Duration::from_millis(420),
            event: PipeEvent::Unpipe {
                severed_by: StageId::Sink,
            },
        };
        assert_eq!(
            render_event(&event, PLAIN),
            "t=   420ms unpipe    severed by sink"
        );

        let event = TimedEvent {
            at: Duration::from_millis(5),
            event: PipeEvent::Drain,
        };
        assert_eq!(render_event(&event, PLAIN), "t=     5ms drain");
    }
}
