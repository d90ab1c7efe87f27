use serde::Deserialize;
use std::env;

use crate::{BlobError, BlobResult};

/// Default number of bytes requested per range fetch (64 KiB)
pub const DEFAULT_WINDOW_SIZE: usize = 64 * 1024;

/// Default read-ahead capacity of the chunk queue (four windows)
pub const DEFAULT_BUFFER_CAPACITY: usize = 4 * DEFAULT_WINDOW_SIZE;

/// Configuration for blob read streams
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Maximum number of bytes requested per range fetch
    pub window_size: usize,

    /// Read-ahead stops once this many bytes are queued (high-water mark)
    pub buffer_capacity: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl ReaderConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides from `BLOB_READ_WINDOW_SIZE` and `BLOB_READ_BUFFER_CAPACITY`.
    /// Unset variables keep their defaults.
    pub fn from_env() -> BlobResult<Self> {
        fn get_env(key: &str) -> BlobResult<Option<usize>> {
            match env::var(key) {
                Ok(value) => value
                    .trim()
                    .parse::<usize>()
                    .map(Some)
                    .map_err(|_| BlobError::invalid(format!("{} must be a byte count, got {:?}", key, value))),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(env::VarError::NotUnicode(_)) => {
                    Err(BlobError::invalid(format!("{} is not valid unicode", key)))
                }
            }
        }

        let mut config = Self::default();
        if let Some(window_size) = get_env("BLOB_READ_WINDOW_SIZE")? {
            config.window_size = window_size;
        }
        if let Some(buffer_capacity) = get_env("BLOB_READ_BUFFER_CAPACITY")? {
            config.buffer_capacity = buffer_capacity;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the fetch window size
    pub fn with_window_size(mut self, bytes: usize) -> Self {
        self.window_size = bytes;
        self
    }

    /// Set the read-ahead capacity
    pub fn with_buffer_capacity(mut self, bytes: usize) -> Self {
        self.buffer_capacity = bytes;
        self
    }

    pub fn validate(&self) -> BlobResult<()> {
        validate_window_size(self.window_size)?;
        validate_buffer_capacity(self.buffer_capacity)
    }
}

pub(crate) fn validate_window_size(bytes: usize) -> BlobResult<()> {
    if bytes == 0 {
        return Err(BlobError::invalid("window size must be greater than zero"));
    }
    Ok(())
}

pub(crate) fn validate_buffer_capacity(bytes: usize) -> BlobResult<()> {
    if bytes == 0 {
        return Err(BlobError::invalid("buffer capacity must be greater than zero"));
    }
    Ok(())
}
