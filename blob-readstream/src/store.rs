use async_trait::async_trait;

use crate::ByteRange;

/// Range-read primitive of a blob store client.
///
/// Implementations own transport concerns (authentication, connection reuse,
/// retry/backoff). The reader never retries and never interprets `Error`
/// beyond wrapping it.
#[async_trait]
pub trait RangeFetch: Send + Sync {
    /// Per-request options passed through untouched by the reader
    type Options: Default + Send + Sync;

    type Error: std::error::Error + Send + Sync + 'static;

    /// Read `range` of the blob into `buf`.
    ///
    /// `buf.len()` always equals `range.len()`. Returns the number of bytes
    /// written to the front of `buf`, which may be less than requested.
    async fn fetch_range(
        &self,
        range: ByteRange,
        buf: &mut [u8],
        options: &Self::Options,
    ) -> Result<usize, Self::Error>;
}

/// Optional metadata lookup for stores that can report a blob's size
#[async_trait]
pub trait BlobLength: RangeFetch {
    /// Total size of the blob in bytes
    async fn content_length(&self, options: &Self::Options) -> Result<u64, Self::Error>;
}
