//! Fixed-capacity FIFO of chunks, measured in bytes.

use crate::pipeline::chunk::Chunk;
use std::collections::VecDeque;

/// Ordered queue of chunks with a byte capacity.
///
/// `len_bytes()` never exceeds `capacity()`: an enqueue that would overflow is
/// refused and the chunk is handed back to the caller.
#[derive(Debug, Clone)]
pub struct BoundedBuffer {
    items: VecDeque<Chunk>,
    capacity_bytes: usize,
    len_bytes: usize,
}

impl BoundedBuffer {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity_bytes,
            len_bytes: 0,
        }
    }

    /// Append a chunk, or return it unchanged if it does not fit.
    pub fn enqueue(&mut self, chunk: Chunk) -> Result<(), Chunk> {
        if !self.fits(&chunk) {
            return Err(chunk);
        }
        self.len_bytes += chunk.size();
        self.items.push_back(chunk);
        Ok(())
    }

    pub fn dequeue_front(&mut self) -> Option<Chunk> {
        let chunk = self.items.pop_front()?;
        self.len_bytes -= chunk.size();
        Some(chunk)
    }

    pub fn front(&self) -> Option<&Chunk> {
        self.items.front()
    }

    /// Whether `chunk` could be enqueued right now.
    #[inline]
    pub fn fits(&self, chunk: &Chunk) -> bool {
        self.len_bytes + chunk.size() <= self.capacity_bytes
    }

    /// Bytes currently held.
    #[inline]
    pub fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    /// Number of chunks currently held.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity_bytes
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity_bytes - self.len_bytes
    }

    /// High-water mark reached.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len_bytes >= self.capacity_bytes
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every queued chunk, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        self.len_bytes = 0;
        dropped
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(seq: u64, size: usize) -> Chunk {
        Chunk::filled(seq, size, b'a')
    }

    #[test]
    fn test_enqueue_until_full() {
        let mut buf = BoundedBuffer::new(100);
        for seq in 1..=4 {
            assert!(buf.enqueue(chunk(seq, 25)).is_ok());
        }
        assert!(buf.is_full());
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.len_bytes(), 100);
        assert_eq!(buf.remaining(), 0);

        let rejected = buf.enqueue(chunk(5, 25)).unwrap_err();
        assert_eq!(rejected.seq(), 5);
        assert_eq!(buf.len_bytes(), 100);
    }

    #[test]
    fn test_dequeue_is_fifo() {
        let mut buf = BoundedBuffer::new(100);
        buf.enqueue(chunk(1, 10)).unwrap();
        buf.enqueue(chunk(2, 20)).unwrap();
        buf.enqueue(chunk(3, 30)).unwrap();

        assert_eq!(buf.front().map(Chunk::seq), Some(1));
        assert_eq!(buf.dequeue_front().map(|c| c.seq()), Some(1));
        assert_eq!(buf.len_bytes(), 50);
        assert_eq!(buf.dequeue_front().map(|c| c.seq()), Some(2));
        assert_eq!(buf.dequeue_front().map(|c| c.seq()), Some(3));
        assert!(buf.dequeue_front().is_none());
        assert!(buf.is_empty());
        assert_eq!(buf.len_bytes(), 0);
    }

    #[test]
    fn test_variable_size_rejection_before_full() {
        let mut buf = BoundedBuffer::new(100);
        buf.enqueue(chunk(1, 80)).unwrap();
        assert!(!buf.is_full());
        assert!(!buf.fits(&chunk(2, 25)));
        assert!(buf.enqueue(chunk(2, 25)).is_err());
        assert!(buf.enqueue(chunk(3, 20)).is_ok());
        assert!(buf.is_full());
    }

    #[test]
    fn test_clear_reports_discarded() {
        let mut buf = BoundedBuffer::new(100);
        buf.enqueue(chunk(1, 25)).unwrap();
        buf.enqueue(chunk(2, 25)).unwrap();
        assert_eq!(buf.clear(), 2);
        assert!(buf.is_empty());
        assert_eq!(buf.len_bytes(), 0);
        assert_eq!(buf.clear(), 0);
    }

    #[test]
    fn test_zero_sized_chunk_always_fits() {
        let mut buf = BoundedBuffer::new(10);
        buf.enqueue(chunk(1, 10)).unwrap();
        assert!(buf.enqueue(Chunk::new(2, Vec::new())).is_ok());
        assert_eq!(buf.len(), 2);
    }
}
