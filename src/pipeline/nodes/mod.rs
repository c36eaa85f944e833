//! The two concrete ends of the pipe.

pub mod sink;
pub mod source;

pub use sink::{Sink, SinkState};
pub use source::{Source, SourceState};
