use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{BlobLength, ByteRange, RangeFetch};

/// Error returned by [`MemoryBlobStore`] for reads past the end of the blob
#[derive(Debug, thiserror::Error)]
#[error("range {range} is out of bounds for a blob of {size} bytes")]
pub struct OutOfBounds {
    pub range: ByteRange,
    pub size: u64,
}

/// Blob held entirely in memory.
///
/// Useful for tests and for serving already-cached objects through the same
/// streaming path as remote ones.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    data: Bytes,
    fetches: AtomicU64,
}

impl MemoryBlobStore {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            fetches: AtomicU64::new(0),
        }
    }

    /// Number of range fetches served so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[async_trait]
impl RangeFetch for MemoryBlobStore {
    type Options = ();
    type Error = OutOfBounds;

    async fn fetch_range(
        &self,
        range: ByteRange,
        buf: &mut [u8],
        _options: &(),
    ) -> Result<usize, OutOfBounds> {
        self.fetches.fetch_add(1, Ordering::Relaxed);

        if range.start > range.end || range.end > self.size() {
            return Err(OutOfBounds {
                range,
                size: self.size(),
            });
        }

        let src = &self.data[range.start as usize..range.end as usize];
        let n = src.len().min(buf.len());
        buf[..n].copy_from_slice(&src[..n]);
        Ok(n)
    }
}

#[async_trait]
impl BlobLength for MemoryBlobStore {
    async fn content_length(&self, _options: &()) -> Result<u64, OutOfBounds> {
        Ok(self.size())
    }
}
