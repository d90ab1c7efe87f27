use bytes::Bytes;
use std::collections::VecDeque;

/// FIFO of fetched chunks that have not been handed to the consumer yet.
///
/// `capacity` is a high-water mark in bytes: [`is_full`](Self::is_full) tells
/// the read-ahead loop to stop, but a single push may overshoot it by up to
/// one chunk.
#[derive(Debug, Clone)]
pub struct ChunkQueue {
    chunks: VecDeque<Bytes>,
    len: usize,
    capacity: usize,
}

impl ChunkQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            len: 0,
            capacity,
        }
    }

    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.chunks.push_back(chunk);
    }

    pub fn pop(&mut self) -> Option<Bytes> {
        let chunk = self.chunks.pop_front()?;
        self.len -= chunk.len();
        Some(chunk)
    }

    /// Discard every queued chunk. Returns the number of bytes dropped.
    pub fn drain(&mut self) -> usize {
        let dropped = self.len;
        self.chunks.clear();
        self.len = 0;
        dropped
    }

    /// Queued bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
