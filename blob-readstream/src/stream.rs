use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::validate_buffer_capacity;
use crate::{
    BlobLength, BlobResult, ByteStream, ChunkQueue, RangeFetch, ReaderConfig, WindowedBlobReader,
};

/// Consumer-facing byte stream over a [`WindowedBlobReader`].
///
/// Chunks fetched ahead by [`fill`](Self::fill) wait in a [`ChunkQueue`] until
/// the consumer asks for them. Every reposition drains that queue first, so
/// bytes fetched before a seek are never delivered after it.
#[derive(Debug)]
pub struct BlobReadStream<F: RangeFetch> {
    reader: WindowedBlobReader<F>,
    queue: ChunkQueue,
}

impl<F: RangeFetch> BlobReadStream<F> {
    /// Wrap `reader` with a read-ahead queue of `buffer_capacity` bytes.
    /// A capacity of 0 is rejected.
    pub fn new(reader: WindowedBlobReader<F>, buffer_capacity: usize) -> BlobResult<Self> {
        validate_buffer_capacity(buffer_capacity)?;
        Ok(Self {
            reader,
            queue: ChunkQueue::new(buffer_capacity),
        })
    }

    /// Build a reader and its queue from `config`
    pub fn with_config(fetcher: Arc<F>, content_length: u64, config: &ReaderConfig) -> BlobResult<Self> {
        let reader = WindowedBlobReader::with_config(fetcher, content_length, config)?;
        Self::new(reader, config.buffer_capacity)
    }

    /// Query the blob's length once and open a stream over it
    pub async fn open(fetcher: Arc<F>, options: F::Options, config: &ReaderConfig) -> BlobResult<Self>
    where
        F: BlobLength,
    {
        let reader = WindowedBlobReader::open(fetcher, options, config).await?;
        Self::new(reader, config.buffer_capacity)
    }

    /// Next chunk in read order: queued bytes first, then a fresh fetch.
    /// `Ok(None)` means end of stream.
    pub async fn next_chunk(&mut self) -> BlobResult<Option<Bytes>> {
        if let Some(chunk) = self.pop_queued() {
            return Ok(Some(chunk));
        }
        self.reader.pull().await
    }

    /// Like [`next_chunk`](Self::next_chunk), but abandons a fetch when
    /// `cancel` completes first. Queued chunks are returned without waiting.
    pub async fn next_chunk_or_cancel<C>(&mut self, cancel: C) -> BlobResult<Option<Bytes>>
    where
        C: Future<Output = ()>,
    {
        if let Some(chunk) = self.pop_queued() {
            return Ok(Some(chunk));
        }
        self.reader.pull_or_cancel(cancel).await
    }

    fn pop_queued(&mut self) -> Option<Bytes> {
        let chunk = self.queue.pop()?;
        trace!(
            session = %self.reader.session_id(),
            len = chunk.len(),
            queued = self.queue.len(),
            "delivered queued chunk"
        );
        Some(chunk)
    }

    /// Read ahead until the queue reaches its capacity or the blob ends.
    /// Returns the number of bytes added to the queue.
    pub async fn fill(&mut self) -> BlobResult<usize> {
        let mut added = 0;
        while !self.queue.is_full() {
            match self.reader.pull().await? {
                Some(chunk) => {
                    added += chunk.len();
                    self.queue.push(chunk);
                }
                None => break,
            }
        }
        Ok(added)
    }

    /// Drop queued chunks, then move the cursor forward (clamped to the end
    /// of the blob). `None` moves by one window. Returns the new position.
    pub fn seek_forward(&mut self, bytes: Option<u64>) -> u64 {
        self.drain();
        self.reader.seek_forward(bytes)
    }

    /// Drop queued chunks, then move the cursor backward (clamped to the start
    /// of the blob). `None` moves by one window. Returns the new position.
    pub fn seek_backward(&mut self, bytes: Option<u64>) -> u64 {
        self.drain();
        self.reader.seek_backward(bytes)
    }

    fn drain(&mut self) {
        let dropped = self.queue.drain();
        if dropped > 0 {
            debug!(session = %self.reader.session_id(), dropped, "drained queued bytes");
        }
    }

    /// Replace the window size used by subsequent fetches
    pub fn adjust_window(&mut self, bytes: usize) -> BlobResult<()> {
        self.reader.adjust_window(bytes)
    }

    /// Bytes fetched but not yet delivered
    pub fn buffered_len(&self) -> usize {
        self.queue.len()
    }

    /// Offset of the next byte the reader will fetch
    pub fn position(&self) -> u64 {
        self.reader.position()
    }

    pub fn reader(&self) -> &WindowedBlobReader<F> {
        &self.reader
    }

    /// Give back the reader, discarding any queued chunks
    pub fn into_reader(self) -> WindowedBlobReader<F> {
        self.reader
    }

    /// Turn this into a [`ByteStream`] that yields chunks until end of stream,
    /// or yields the error once and ends.
    pub fn into_stream(mut self) -> ByteStream
    where
        F: 'static,
    {
        Box::pin(async_stream::stream! {
            loop {
                match self.next_chunk().await {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(std::io::Error::from(e));
                        break;
                    }
                }
            }
        })
    }
}
