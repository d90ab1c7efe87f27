//! # blob-readstream: windowed streaming reads of remote blobs
//!
//! `blob-readstream` exposes a remote, range-addressable object as a
//! pull-based byte stream without holding the whole object in memory.
//!
//! ## Key Features
//!
//! - **Bounded fetches**: every request covers at most one window (64 KiB by default)
//! - **Exact end handling**: the last chunk is cut to the remaining bytes, never over-read
//! - **Repositioning**: forward/backward seeks that drop stale read-ahead data
//! - **Strict failures**: a failed range read ends the stream, nothing is skipped
//! - **Storage agnostic**: any store implementing [`RangeFetch`] (S3 and in-memory included)
//!
//! ## Quick Start
//!
//! ```rust
//! use blob_readstream::prelude::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> BlobResult<()> {
//! let store = Arc::new(MemoryBlobStore::new(vec![42u8; 150_000]));
//! let config = ReaderConfig::default();
//!
//! let mut stream = BlobReadStream::open(store, (), &config).await?;
//!
//! let mut total = 0;
//! while let Some(chunk) = stream.next_chunk().await? {
//!     total += chunk.len();
//! }
//! assert_eq!(total, 150_000);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────┐
//! │   BlobReadStream   │  ← read-ahead queue, drain on seek
//! ├────────────────────┤
//! │ WindowedBlobReader │  ← cursor, window, end-of-blob
//! ├────────────────────┤
//! │     RangeFetch     │  ← store client (S3, memory, custom)
//! └────────────────────┘
//! ```

mod buffer;
mod config;
mod error;
mod memory_store;
pub mod reader;
mod s3_store;
pub mod store;
pub mod stream;
mod types;

// Re-export main types for clean API
pub use buffer::ChunkQueue;
pub use config::{ReaderConfig, DEFAULT_BUFFER_CAPACITY, DEFAULT_WINDOW_SIZE};
pub use error::{BlobError, BlobResult};
pub use memory_store::{MemoryBlobStore, OutOfBounds};
pub use reader::WindowedBlobReader;
pub use s3_store::{S3BlobFetcher, S3Config, S3FetchError, S3FetchOptions};
pub use store::{BlobLength, RangeFetch};
pub use stream::BlobReadStream;
pub use types::{content_length_from_signed, ByteRange, ByteStream, ReadSessionId};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BlobError, BlobLength, BlobReadStream, BlobResult, ByteRange, ByteStream, MemoryBlobStore,
        RangeFetch, ReaderConfig, WindowedBlobReader,
    };
}
