use bytes::Bytes;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::validate_window_size;
use crate::{
    BlobError, BlobLength, BlobResult, ByteRange, RangeFetch, ReadSessionId, ReaderConfig,
    DEFAULT_WINDOW_SIZE,
};

/// Cursor over a remote blob that reads it in bounded range fetches.
///
/// Each [`pull`](Self::pull) issues at most one fetch of up to `window_size`
/// bytes starting at the cursor, and advances the cursor by the number of
/// bytes the store actually returned. The reader keeps no buffer of its own;
/// read-ahead and draining live in [`BlobReadStream`](crate::BlobReadStream).
pub struct WindowedBlobReader<F: RangeFetch> {
    fetcher: Arc<F>,
    cursor: u64,
    content_length: u64,
    window_size: usize,
    fetch_options: F::Options,
    terminated: bool,
    session_id: ReadSessionId,
}

impl<F: RangeFetch> WindowedBlobReader<F> {
    /// Create a reader with the default window and default fetch options
    pub fn new(fetcher: Arc<F>, content_length: u64) -> Self {
        let session_id = ReadSessionId::new();
        debug!(session = %session_id, content_length, window_size = DEFAULT_WINDOW_SIZE, "opened blob reader");

        Self {
            fetcher,
            cursor: 0,
            content_length,
            window_size: DEFAULT_WINDOW_SIZE,
            fetch_options: F::Options::default(),
            terminated: false,
            session_id,
        }
    }

    /// Create a reader using the window size from `config`
    pub fn with_config(fetcher: Arc<F>, content_length: u64, config: &ReaderConfig) -> BlobResult<Self> {
        config.validate()?;
        Self::new(fetcher, content_length).with_window_size(config.window_size)
    }

    /// Query the blob's length once and create a reader for it
    pub async fn open(fetcher: Arc<F>, options: F::Options, config: &ReaderConfig) -> BlobResult<Self>
    where
        F: BlobLength,
    {
        config.validate()?;
        let content_length = fetcher
            .content_length(&options)
            .await
            .map_err(|e| BlobError::LengthUnavailable { source: Box::new(e) })?;

        Ok(Self::with_config(fetcher, content_length, config)?.with_fetch_options(options))
    }

    /// Set the initial window size
    pub fn with_window_size(mut self, bytes: usize) -> BlobResult<Self> {
        validate_window_size(bytes)?;
        self.window_size = bytes;
        Ok(self)
    }

    /// Set the options passed to every range fetch
    pub fn with_fetch_options(mut self, options: F::Options) -> Self {
        self.fetch_options = options;
        self
    }

    /// Fetch the next chunk.
    ///
    /// Returns `Ok(None)` once the cursor reaches the end of the blob, without
    /// contacting the store. A fetch error terminates the reader: it is
    /// returned once as [`BlobError::FetchFailed`] and every later pull fails
    /// with [`BlobError::Terminated`].
    pub async fn pull(&mut self) -> BlobResult<Option<Bytes>> {
        let Some(range) = self.begin_pull()? else {
            return Ok(None);
        };

        let mut buf = vec![0u8; range.len() as usize];
        let result = self.fetcher.fetch_range(range, &mut buf, &self.fetch_options).await;
        self.complete_pull(range, buf, result)
    }

    /// Like [`pull`](Self::pull), but gives up when `cancel` completes first.
    ///
    /// A cancelled pull leaves the cursor where it was and does not terminate
    /// the reader.
    pub async fn pull_or_cancel<C>(&mut self, cancel: C) -> BlobResult<Option<Bytes>>
    where
        C: Future<Output = ()>,
    {
        let Some(range) = self.begin_pull()? else {
            return Ok(None);
        };

        let mut buf = vec![0u8; range.len() as usize];
        let result = tokio::select! {
            biased;
            _ = cancel => {
                warn!(session = %self.session_id, range = %range, "range fetch cancelled");
                return Err(BlobError::Cancelled { range });
            }
            result = self.fetcher.fetch_range(range, &mut buf, &self.fetch_options) => result,
        };
        self.complete_pull(range, buf, result)
    }

    /// Range the next pull will request, or `None` at end of stream
    fn begin_pull(&self) -> BlobResult<Option<ByteRange>> {
        if self.terminated {
            return Err(BlobError::Terminated);
        }
        if self.cursor >= self.content_length {
            debug!(session = %self.session_id, cursor = self.cursor, "end of blob reached");
            return Ok(None);
        }

        let len = (self.window_size as u64).min(self.content_length - self.cursor);
        let range = ByteRange::with_len(self.cursor, len);
        debug!(session = %self.session_id, range = %range, "fetching blob range");
        Ok(Some(range))
    }

    fn complete_pull(
        &mut self,
        range: ByteRange,
        mut buf: Vec<u8>,
        result: Result<usize, F::Error>,
    ) -> BlobResult<Option<Bytes>> {
        match result {
            Ok(n) if n > buf.len() => {
                self.terminated = true;
                warn!(session = %self.session_id, range = %range, returned = n, "store returned more bytes than requested");
                Err(BlobError::protocol(
                    range,
                    format!("returned {} bytes for a {} byte request", n, buf.len()),
                ))
            }
            Ok(0) => {
                self.terminated = true;
                warn!(session = %self.session_id, range = %range, "store returned no bytes before end of blob");
                Err(BlobError::protocol(range, "returned no bytes before end of blob"))
            }
            Ok(n) => {
                buf.truncate(n);
                self.cursor += n as u64;
                Ok(Some(Bytes::from(buf)))
            }
            Err(e) => {
                self.terminated = true;
                warn!(session = %self.session_id, range = %range, error = %e, "range fetch failed");
                Err(BlobError::fetch_failed(range, e))
            }
        }
    }

    /// Replace the window size used by subsequent pulls
    pub fn adjust_window(&mut self, bytes: usize) -> BlobResult<()> {
        validate_window_size(bytes)?;
        debug!(session = %self.session_id, from = self.window_size, to = bytes, "adjusted fetch window");
        self.window_size = bytes;
        Ok(())
    }

    /// Move the cursor forward, stopping at the end of the blob.
    /// `None` moves by one window. Returns the new position.
    pub fn seek_forward(&mut self, bytes: Option<u64>) -> u64 {
        let bytes = bytes.unwrap_or(self.window_size as u64);
        self.cursor = self.cursor.saturating_add(bytes).min(self.content_length);
        debug!(session = %self.session_id, bytes, cursor = self.cursor, "seeked forward");
        self.cursor
    }

    /// Move the cursor backward, stopping at the start of the blob.
    /// `None` moves by one window. Returns the new position.
    pub fn seek_backward(&mut self, bytes: Option<u64>) -> u64 {
        let bytes = bytes.unwrap_or(self.window_size as u64);
        self.cursor = self.cursor.saturating_sub(bytes);
        debug!(session = %self.session_id, bytes, cursor = self.cursor, "seeked backward");
        self.cursor
    }

    /// Offset of the next byte to fetch
    pub fn position(&self) -> u64 {
        self.cursor
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Bytes between the cursor and the end of the blob
    pub fn remaining(&self) -> u64 {
        self.content_length - self.cursor
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn fetch_options(&self) -> &F::Options {
        &self.fetch_options
    }

    pub fn session_id(&self) -> ReadSessionId {
        self.session_id
    }

    /// Whether the cursor is at the end of the blob
    pub fn is_finished(&self) -> bool {
        self.cursor >= self.content_length
    }

    /// Whether a failed fetch has ended this reader
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl<F: RangeFetch> fmt::Debug for WindowedBlobReader<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowedBlobReader")
            .field("session_id", &self.session_id)
            .field("cursor", &self.cursor)
            .field("content_length", &self.content_length)
            .field("window_size", &self.window_size)
            .field("terminated", &self.terminated)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBlobStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Store that records requested ranges and can be told to misbehave
    #[derive(Default)]
    struct ScriptedStore {
        size: u64,
        calls: Mutex<Vec<ByteRange>>,
        fail_on_call: Option<usize>,
        short_by: usize,
        overreport: bool,
        zero_bytes: bool,
        stall_on_call: Option<usize>,
    }

    impl ScriptedStore {
        fn new(size: u64) -> Self {
            Self {
                size,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<ByteRange> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RangeFetch for ScriptedStore {
        type Options = ();
        type Error = std::io::Error;

        async fn fetch_range(&self, range: ByteRange, buf: &mut [u8], _: &()) -> std::io::Result<usize> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(range);
                calls.len()
            };
            assert!(range.end <= self.size);
            assert_eq!(buf.len() as u64, range.len());

            if self.fail_on_call == Some(call) {
                return Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset"));
            }
            if self.overreport {
                return Ok(buf.len() + 1);
            }
            if self.zero_bytes {
                return Ok(0);
            }

            let n = buf.len().saturating_sub(self.short_by).max(1);
            for (i, byte) in buf[..n].iter_mut().enumerate() {
                *byte = ((range.start + i as u64) % 251) as u8;
            }
            if self.stall_on_call == Some(call) {
                std::future::pending::<()>().await;
            }
            Ok(n)
        }
    }

    async fn chunk_lengths<F: RangeFetch>(reader: &mut WindowedBlobReader<F>) -> Vec<usize> {
        let mut lengths = Vec::new();
        while let Some(chunk) = reader.pull().await.unwrap() {
            lengths.push(chunk.len());
        }
        lengths
    }

    #[tokio::test]
    async fn test_final_chunk_is_truncated() {
        let store = Arc::new(ScriptedStore::new(150_000));
        let mut reader = WindowedBlobReader::new(store.clone(), 150_000);

        assert_eq!(chunk_lengths(&mut reader).await, vec![65536, 65536, 18928]);
        assert_eq!(reader.position(), 150_000);
        assert_eq!(
            store.calls(),
            vec![
                ByteRange::new(0, 65536),
                ByteRange::new(65536, 131072),
                ByteRange::new(131072, 150_000),
            ]
        );
    }

    #[tokio::test]
    async fn test_end_of_stream_is_idempotent_and_free() {
        let store = Arc::new(ScriptedStore::new(0));
        let mut reader = WindowedBlobReader::new(store.clone(), 0);

        assert!(reader.pull().await.unwrap().is_none());
        assert!(reader.pull().await.unwrap().is_none());
        assert!(reader.is_finished());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_chunk_contents_follow_cursor() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let store = Arc::new(MemoryBlobStore::new(data.clone()));
        let mut reader = WindowedBlobReader::new(store, 1000).with_window_size(300).unwrap();

        let mut out = Vec::new();
        while let Some(chunk) = reader.pull().await.unwrap() {
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_seek_backward_after_full_read() {
        let store = Arc::new(ScriptedStore::new(100));
        let mut reader = WindowedBlobReader::new(store.clone(), 100);

        assert_eq!(chunk_lengths(&mut reader).await, vec![100]);
        assert_eq!(reader.seek_backward(Some(40)), 60);

        let chunk = reader.pull().await.unwrap().unwrap();
        assert_eq!(chunk.len(), 40);
        assert_eq!(store.calls().last(), Some(&ByteRange::new(60, 100)));
    }

    #[tokio::test]
    async fn test_seeks_clamp_to_blob_bounds() {
        let store = Arc::new(ScriptedStore::new(100));
        let mut reader = WindowedBlobReader::new(store, 100).with_window_size(30).unwrap();

        assert_eq!(reader.seek_forward(Some(90)), 90);
        assert_eq!(reader.seek_forward(Some(u64::MAX)), 100);
        assert_eq!(reader.seek_backward(Some(250)), 0);

        // default distance is one window
        assert_eq!(reader.seek_forward(None), 30);
        assert_eq!(reader.seek_backward(None), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_terminal() {
        let store = Arc::new(ScriptedStore {
            fail_on_call: Some(2),
            ..ScriptedStore::new(200)
        });
        let mut reader = WindowedBlobReader::new(store.clone(), 200).with_window_size(64).unwrap();

        assert_eq!(reader.pull().await.unwrap().unwrap().len(), 64);

        let err = reader.pull().await.unwrap_err();
        match &err {
            BlobError::FetchFailed { range, source } => {
                assert_eq!(*range, ByteRange::new(64, 128));
                assert_eq!(source.to_string(), "connection reset");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(reader.position(), 64);
        assert!(reader.is_terminated());

        assert!(matches!(reader.pull().await, Err(BlobError::Terminated)));
        assert_eq!(store.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_short_reads_advance_by_actual_length() {
        let store = Arc::new(ScriptedStore {
            short_by: 10,
            ..ScriptedStore::new(100)
        });
        let mut reader = WindowedBlobReader::new(store.clone(), 100).with_window_size(50).unwrap();

        assert_eq!(reader.pull().await.unwrap().unwrap().len(), 40);
        assert_eq!(reader.position(), 40);

        reader.pull().await.unwrap();
        assert_eq!(store.calls()[1], ByteRange::new(40, 90));
    }

    #[tokio::test]
    async fn test_overreporting_store_terminates_reader() {
        let store = Arc::new(ScriptedStore {
            overreport: true,
            ..ScriptedStore::new(100)
        });
        let mut reader = WindowedBlobReader::new(store, 100);

        assert!(matches!(reader.pull().await, Err(BlobError::ProtocolViolation { .. })));
        assert_eq!(reader.position(), 0);
        assert!(reader.is_terminated());
    }

    #[tokio::test]
    async fn test_empty_fetch_before_end_terminates_reader() {
        let store = Arc::new(ScriptedStore {
            zero_bytes: true,
            ..ScriptedStore::new(100)
        });
        let mut reader = WindowedBlobReader::new(store.clone(), 100).with_window_size(10).unwrap();

        let err = reader.pull().await.unwrap_err();
        assert!(matches!(err, BlobError::ProtocolViolation { range, .. } if range == ByteRange::new(0, 10)));
        assert!(err.is_terminal());
        assert_eq!(reader.position(), 0);
        assert!(reader.is_terminated());

        assert!(matches!(reader.pull().await, Err(BlobError::Terminated)));
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_adjust_window_applies_to_next_pull() {
        let store = Arc::new(ScriptedStore::new(1000));
        let mut reader = WindowedBlobReader::new(store.clone(), 1000).with_window_size(100).unwrap();

        reader.pull().await.unwrap();
        reader.adjust_window(250).unwrap();
        reader.pull().await.unwrap();

        assert_eq!(store.calls(), vec![ByteRange::new(0, 100), ByteRange::new(100, 350)]);
        assert!(matches!(
            reader.adjust_window(0),
            Err(BlobError::InvalidConfiguration { .. })
        ));
        assert_eq!(reader.window_size(), 250);
    }

    #[tokio::test]
    async fn test_zero_window_rejected_at_construction() {
        let store = Arc::new(ScriptedStore::new(10));
        assert!(WindowedBlobReader::new(store.clone(), 10).with_window_size(0).is_err());

        let config = ReaderConfig::new().with_window_size(0);
        assert!(WindowedBlobReader::with_config(store, 10, &config).is_err());
    }

    #[tokio::test]
    async fn test_cancelled_pull_keeps_cursor() {
        let store = Arc::new(ScriptedStore::new(100));
        let mut reader = WindowedBlobReader::new(store.clone(), 100).with_window_size(10).unwrap();

        let err = reader.pull_or_cancel(std::future::ready(())).await.unwrap_err();
        assert!(matches!(err, BlobError::Cancelled { range } if range == ByteRange::new(0, 10)));
        assert!(!err.is_terminal());
        assert_eq!(reader.position(), 0);
        assert!(!reader.is_terminated());
        assert!(store.calls().is_empty());

        let chunk = reader.pull_or_cancel(std::future::pending()).await.unwrap().unwrap();
        assert_eq!(chunk.len(), 10);
        assert_eq!(reader.position(), 10);
    }

    #[tokio::test]
    async fn test_cancel_during_fetch_keeps_cursor() {
        let store = Arc::new(ScriptedStore {
            stall_on_call: Some(1),
            ..ScriptedStore::new(100)
        });
        let mut reader = WindowedBlobReader::new(store.clone(), 100).with_window_size(10).unwrap();

        let cancel = tokio::time::sleep(std::time::Duration::from_millis(20));
        let err = reader.pull_or_cancel(cancel).await.unwrap_err();

        assert!(matches!(err, BlobError::Cancelled { range } if range == ByteRange::new(0, 10)));
        assert_eq!(store.calls(), vec![ByteRange::new(0, 10)]);
        assert_eq!(reader.position(), 0);
        assert!(!reader.is_terminated());

        // the retried fetch starts from the same offset
        let chunk = reader.pull().await.unwrap().unwrap();
        assert_eq!(chunk.len(), 10);
        assert_eq!(chunk[0], 0);
        assert_eq!(store.calls()[1], ByteRange::new(0, 10));
        assert_eq!(reader.position(), 10);
    }

    #[tokio::test]
    async fn test_open_queries_length() {
        let store = Arc::new(MemoryBlobStore::new(vec![7u8; 1234]));
        let config = ReaderConfig::new().with_window_size(1000);
        let mut reader = WindowedBlobReader::open(store, (), &config).await.unwrap();

        assert_eq!(reader.content_length(), 1234);
        assert_eq!(chunk_lengths(&mut reader).await, vec![1000, 234]);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_failure_is_logged() {
        let store = Arc::new(ScriptedStore {
            fail_on_call: Some(1),
            ..ScriptedStore::new(10)
        });
        let mut reader = WindowedBlobReader::new(store, 10);

        assert!(reader.pull().await.is_err());
        assert!(logs_contain("range fetch failed"));
        assert!(logs_contain("connection reset"));
    }
}
