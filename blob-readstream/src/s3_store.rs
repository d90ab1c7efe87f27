use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use std::env;
use tracing::debug;

use crate::{content_length_from_signed, BlobError, BlobLength, BlobResult, ByteRange, RangeFetch};

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint_url: Option<String>,
    /// Required by most self-hosted S3-compatible servers
    pub force_path_style: bool,
}

impl S3Config {
    /// Read `S3_REGION`, `S3_ACCESS_KEY_ID`, `S3_SECRET_ACCESS_KEY` and the
    /// optional `S3_ENDPOINT_URL` / `S3_FORCE_PATH_STYLE`.
    pub fn from_env() -> BlobResult<Self> {
        fn get_env(key: &str) -> BlobResult<String> {
            env::var(key).map_err(|_| BlobError::invalid(format!("{} environment variable required", key)))
        }

        let force_path_style = match env::var("S3_FORCE_PATH_STYLE") {
            Ok(value) => value
                .parse::<bool>()
                .map_err(|_| BlobError::invalid(format!("S3_FORCE_PATH_STYLE must be true or false, got {:?}", value)))?,
            Err(_) => false,
        };

        Ok(Self {
            region: get_env("S3_REGION")?,
            access_key_id: get_env("S3_ACCESS_KEY_ID")?,
            secret_access_key: get_env("S3_SECRET_ACCESS_KEY")?,
            endpoint_url: env::var("S3_ENDPOINT_URL").ok(),
            force_path_style,
        })
    }

    /// Build an SDK client for this endpoint
    pub async fn client(self) -> Client {
        let credentials = Credentials::new(
            self.access_key_id,
            self.secret_access_key,
            None,
            None,
            "blob-readstream",
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(self.region))
            .credentials_provider(credentials);
        if let Some(endpoint_url) = self.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let aws_config = loader.load().await;

        Client::from_conf(
            aws_sdk_s3::config::Builder::from(&aws_config)
                .force_path_style(self.force_path_style)
                .build(),
        )
    }
}

/// Per-request options for [`S3BlobFetcher`]
#[derive(Debug, Clone, Default)]
pub struct S3FetchOptions {
    /// Read a specific object version
    pub version_id: Option<String>,
    /// Fail the read if the object's ETag changed since it was opened
    pub if_match: Option<String>,
}

/// Errors raised by [`S3BlobFetcher`]
#[derive(Debug, thiserror::Error)]
pub enum S3FetchError {
    #[error("S3 request failed: {source}")]
    Request {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("S3 response body could not be read: {source}")]
    Body {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("S3 response for {requested} does not match the request (content range {content_range:?}, {received} bytes)")]
    RangeMismatch {
        requested: ByteRange,
        content_range: Option<String>,
        received: usize,
    },

    #[error("S3 object has no content length")]
    MissingContentLength,

    #[error("S3 object metadata is invalid: {source}")]
    InvalidMetadata {
        #[source]
        source: BlobError,
    },
}

impl S3FetchError {
    fn request<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Request {
            source: Box::new(error),
        }
    }

    fn body<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Body {
            source: Box::new(error),
        }
    }
}

/// Reject responses that do not start at `range.start` or do not fit in it.
///
/// A server that ignores the `Range` header answers with the whole object and
/// no `Content-Range`; that body is only usable when the request started at
/// offset 0 and the object fits the window.
fn check_response_range(
    range: ByteRange,
    content_range: Option<&str>,
    received: usize,
    capacity: usize,
) -> Result<(), S3FetchError> {
    let mismatch = || S3FetchError::RangeMismatch {
        requested: range,
        content_range: content_range.map(str::to_owned),
        received,
    };

    if received > capacity || received as u64 > range.len() {
        return Err(mismatch());
    }

    let start = match content_range {
        Some(value) => parse_content_range_start(value).ok_or_else(mismatch)?,
        None => 0,
    };
    if start != range.start {
        return Err(mismatch());
    }
    Ok(())
}

/// First offset of a `Content-Range: bytes <first>-<last>/<total>` value
fn parse_content_range_start(value: &str) -> Option<u64> {
    let spec = value.trim().strip_prefix("bytes")?.trim_start();
    let (first, _) = spec.split_once('-')?;
    first.trim().parse().ok()
}

/// Range reads of a single object in an S3-compatible store.
///
/// Each fetch is one `GetObject` with a `Range` header. Retries are left to
/// the SDK's retry configuration.
#[derive(Debug, Clone)]
pub struct S3BlobFetcher {
    client: Client,
    bucket: String,
    key: String,
}

impl S3BlobFetcher {
    pub fn new(client: Client, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Connect using [`S3Config::from_env`]
    pub async fn from_env(bucket: impl Into<String>, key: impl Into<String>) -> BlobResult<Self> {
        let client = S3Config::from_env()?.client().await;
        Ok(Self::new(client, bucket, key))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl RangeFetch for S3BlobFetcher {
    type Options = S3FetchOptions;
    type Error = S3FetchError;

    async fn fetch_range(
        &self,
        range: ByteRange,
        buf: &mut [u8],
        options: &S3FetchOptions,
    ) -> Result<usize, S3FetchError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .range(range.to_http_header())
            .set_version_id(options.version_id.clone())
            .set_if_match(options.if_match.clone())
            .send()
            .await
            .map_err(S3FetchError::request)?;

        let content_range = output.content_range().map(str::to_owned);
        let body = output.body.collect().await.map_err(S3FetchError::body)?.into_bytes();
        check_response_range(range, content_range.as_deref(), body.len(), buf.len())?;
        buf[..body.len()].copy_from_slice(&body);

        debug!(bucket = %self.bucket, key = %self.key, range = %range, received = body.len(), "fetched S3 range");
        Ok(body.len())
    }
}

#[async_trait]
impl BlobLength for S3BlobFetcher {
    async fn content_length(&self, options: &S3FetchOptions) -> Result<u64, S3FetchError> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .set_version_id(options.version_id.clone())
            .set_if_match(options.if_match.clone())
            .send()
            .await
            .map_err(S3FetchError::request)?;

        let length = output.content_length().ok_or(S3FetchError::MissingContentLength)?;
        content_length_from_signed(length).map_err(|source| S3FetchError::InvalidMetadata { source })
    }
}
