//! The unit of data moved through the pipe.
//!
//! A `Chunk` is immutable once created. The payload lives behind an `Arc` so
//! the sink can take its own copy during a handoff while the source keeps the
//! original queued until the transfer is confirmed.

use std::fmt;
use std::sync::Arc;

/// Immutable unit of transferred data.
#[derive(Clone, PartialEq, Eq)]
pub struct Chunk {
    seq: u64,
    payload: Arc<[u8]>,
}

impl Chunk {
    /// Create a chunk with an explicit payload.
    pub fn new(seq: u64, payload: impl Into<Arc<[u8]>>) -> Self {
        Self {
            seq,
            payload: payload.into(),
        }
    }

    /// Create a chunk of `size` bytes, every byte set to `fill`.
    pub fn filled(seq: u64, size: usize, fill: u8) -> Self {
        Self::new(seq, vec![fill; size])
    }

    /// Generation sequence number (1-based).
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Size of the payload in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// First payload byte as a one-character label.
    pub fn label(&self) -> char {
        self.payload.first().map(|b| *b as char).unwrap_or('.')
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chunk")
            .field("seq", &self.seq)
            .field("size", &self.size())
            .finish()
    }
}

/// Produces the payload for each generated chunk.
///
/// The source asks for one chunk per successful generation, in sequence order.
#[cfg_attr(test, mockall::automock)]
pub trait ChunkFactory: Send {
    fn make(&mut self, seq: u64) -> Chunk;
}

/// Fixed-size chunks filled with a rotating lowercase letter (`a`, `b`, ...).
#[derive(Debug, Clone)]
pub struct LetterChunks {
    size: usize,
}

impl LetterChunks {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl ChunkFactory for LetterChunks {
    fn make(&mut self, seq: u64) -> Chunk {
        let letter = b'a' + (seq.saturating_sub(1) % 26) as u8;
        Chunk::filled(seq, self.size, letter)
    }
}
