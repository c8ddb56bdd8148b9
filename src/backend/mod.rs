//! The backend object-store client seam.
//!
//! `ObjectClient` is what the anonymous gateway talks to. It speaks in the
//! backend's own shapes (`ObjectStat`, `ListBucketResult`, `BucketSummary`)
//! and fails with `ClientError`; translating those into gateway values is the
//! job of `crate::gateway`.

pub mod local;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncSeek};

/// A readable, seekable object payload handed out by the backend.
pub trait ObjectStream: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> ObjectStream for T where T: AsyncRead + AsyncSeek + Send + Unpin {}

/// Owned object stream. Dropping it releases the backend handle.
pub type ObjectReader = Box<dyn ObjectStream>;

/// Object metadata as the backend reports it.
#[derive(Clone, Debug)]
pub struct ObjectStat {
    pub key: String,
    pub size: i64,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub last_modified: DateTime<Utc>,
}

/// One page of a ListObjects (v1) call.
#[derive(Clone, Debug, Default)]
pub struct ListBucketResult {
    pub contents: Vec<ObjectStat>,
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_marker: Option<String>,
}

#[derive(Clone, Debug)]
pub struct BucketSummary {
    pub name: String,
    pub creation_date: DateTime<Utc>,
}

/// Parameters for a ListObjects (v1) call. Empty strings mean "not set".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListObjectsParams {
    pub prefix: String,
    pub marker: String,
    pub delimiter: String,
    pub max_keys: usize,
}

#[derive(Debug, Error)]
pub enum ClientError {
    /// An S3-style error response (`NoSuchKey`, `AccessDenied`, ...).
    #[error("{code}: {message}")]
    Response { code: String, message: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl ClientError {
    pub fn no_such_bucket() -> Self {
        Self::Response {
            code: "NoSuchBucket".into(),
            message: "The specified bucket does not exist".into(),
        }
    }

    pub fn no_such_key() -> Self {
        Self::Response {
            code: "NoSuchKey".into(),
            message: "The specified key does not exist.".into(),
        }
    }

    /// The S3 error code, when the backend answered with one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Response { code, .. } => Some(code),
            _ => None,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Raw bucket/object read operations against a storage service.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Open the object payload for reading, positioned at byte 0.
    async fn get_object(&self, bucket: &str, key: &str) -> ClientResult<ObjectReader>;

    async fn stat_object(&self, bucket: &str, key: &str) -> ClientResult<ObjectStat>;

    async fn list_objects(
        &self,
        bucket: &str,
        params: &ListObjectsParams,
    ) -> ClientResult<ListBucketResult>;

    /// Absence is `Ok(false)`, not an error.
    async fn bucket_exists(&self, bucket: &str) -> ClientResult<bool>;

    async fn list_buckets(&self) -> ClientResult<Vec<BucketSummary>>;
}
