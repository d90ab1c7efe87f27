use thiserror::Error;

use crate::ByteRange;

/// Result type for blob read operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur while streaming a blob
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Range fetch {range} failed: {source}")]
    FetchFailed {
        range: ByteRange,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Could not determine blob length: {source}")]
    LengthUnavailable {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("Range fetch {range} was cancelled")]
    Cancelled { range: ByteRange },

    #[error("Read stream terminated by an earlier failure")]
    Terminated,

    #[error("Range fetch {range} violated the fetch contract: {message}")]
    ProtocolViolation { range: ByteRange, message: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl BlobError {
    /// Wrap a fetcher error for the range that was being read
    pub fn fetch_failed<E>(range: ByteRange, error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::FetchFailed {
            range,
            source: Box::new(error),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }

    pub(crate) fn protocol<S: Into<String>>(range: ByteRange, message: S) -> Self {
        Self::ProtocolViolation {
            range,
            message: message.into(),
        }
    }

    /// Whether the stream can still be pulled after this error
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Cancelled { .. } | Self::InvalidConfiguration { .. })
    }
}

impl From<BlobError> for std::io::Error {
    fn from(err: BlobError) -> std::io::Error {
        let kind = match &err {
            BlobError::Io { source } => source.kind(),
            BlobError::Cancelled { .. } => std::io::ErrorKind::Interrupted,
            BlobError::InvalidConfiguration { .. } => std::io::ErrorKind::InvalidInput,
            BlobError::ProtocolViolation { .. } => std::io::ErrorKind::InvalidData,
            BlobError::FetchFailed { .. }
            | BlobError::LengthUnavailable { .. }
            | BlobError::Terminated => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}
