//! Anonymous access path of the gateway.
//!
//! `AnonGateway` serves reads for callers that present no credentials. By the
//! time a request gets here anonymous access has already been allowed; this
//! layer only forwards to the backend client, converts what comes back into
//! gateway values, and turns every backend failure into an
//! `ObjectLayerError` that names the bucket (and object) involved.

pub mod errors;

use crate::{
    backend::{ListBucketResult, ListObjectsParams, ObjectClient, ObjectReader, ObjectStat},
    models::{
        bucket::BucketInfo,
        list::ListObjectsInfo,
        object::{DEFAULT_CONTENT_TYPE, ObjectInfo},
    },
};
use errors::{ObjectLayerError, ObjectLayerResult, to_object_err};
use std::{
    io::{self, SeekFrom},
    sync::Arc,
};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWrite};
use tracing::debug;

/// Anonymous read adapter over a shared backend client handle.
///
/// Holds no mutable state; clones share the same client.
#[derive(Clone)]
pub struct AnonGateway {
    client: Arc<dyn ObjectClient>,
}

impl AnonGateway {
    pub fn new(client: Arc<dyn ObjectClient>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Arc<dyn ObjectClient> {
        &self.client
    }

    /// Copy `length` bytes of `bucket/key`, starting at `start_offset`, into
    /// `writer`.
    ///
    /// The backend stream is dropped on every return path. Bytes written
    /// before a failure stay written. Running out of object data before
    /// `length` bytes is an error.
    pub async fn anon_get_object<W>(
        &self,
        bucket: &str,
        key: &str,
        start_offset: u64,
        length: u64,
        writer: &mut W,
    ) -> ObjectLayerResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let object = self.anon_open_object(bucket, key, start_offset).await?;
        Self::anon_copy_object(object, bucket, key, length, writer).await
    }

    /// Open `bucket/key` positioned at `start_offset`.
    ///
    /// Lets a caller surface open and seek failures before committing to a
    /// response, then hand the stream to `anon_copy_object`.
    pub async fn anon_open_object(
        &self,
        bucket: &str,
        key: &str,
        start_offset: u64,
    ) -> ObjectLayerResult<ObjectReader> {
        let mut object = self
            .client
            .get_object(bucket, key)
            .await
            .map_err(|err| log_failure(to_object_err(err, bucket, key)))?;

        object
            .seek(SeekFrom::Start(start_offset))
            .await
            .map_err(|err| log_failure(to_object_err(err.into(), bucket, key)))?;

        Ok(object)
    }

    /// Copy exactly `length` bytes from an opened stream, then drop it.
    pub async fn anon_copy_object<W>(
        mut object: ObjectReader,
        bucket: &str,
        key: &str,
        length: u64,
        writer: &mut W,
    ) -> ObjectLayerResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let copied = tokio::io::copy(&mut (&mut object).take(length), writer)
            .await
            .map_err(|err| log_failure(to_object_err(err.into(), bucket, key)))?;

        if copied < length {
            let short = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("copied {} of {} bytes", copied, length),
            );
            return Err(log_failure(to_object_err(short.into(), bucket, key)));
        }

        Ok(())
    }

    pub async fn anon_get_object_info(
        &self,
        bucket: &str,
        object: &str,
    ) -> ObjectLayerResult<ObjectInfo> {
        let stat = self
            .client
            .stat_object(bucket, object)
            .await
            .map_err(|err| log_failure(to_object_err(err, bucket, object)))?;

        from_client_object_info(bucket, stat)
    }

    pub async fn anon_list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: usize,
    ) -> ObjectLayerResult<ListObjectsInfo> {
        let params = ListObjectsParams {
            prefix: prefix.to_string(),
            marker: marker.to_string(),
            delimiter: delimiter.to_string(),
            max_keys,
        };

        let result = self
            .client
            .list_objects(bucket, &params)
            .await
            .map_err(|err| log_failure(to_object_err(err, bucket, "")))?;

        from_client_list_result(bucket, result)
    }

    /// Cheap existence check first, then a scan of the full bucket list.
    ///
    /// A bucket that exists but is missing from the listing (removed between
    /// the two calls) is reported as not found.
    pub async fn anon_get_bucket_info(&self, bucket: &str) -> ObjectLayerResult<BucketInfo> {
        let exists = self
            .client
            .bucket_exists(bucket)
            .await
            .map_err(|err| log_failure(to_object_err(err, bucket, "")))?;
        if !exists {
            return Err(ObjectLayerError::bucket_not_found(bucket));
        }

        let buckets = self
            .client
            .list_buckets()
            .await
            .map_err(|err| log_failure(to_object_err(err, bucket, "")))?;

        buckets
            .into_iter()
            .find(|bi| bi.name == bucket)
            .map(|bi| BucketInfo {
                name: bi.name,
                created: bi.creation_date,
            })
            .ok_or_else(|| {
                debug!(bucket, "bucket vanished between existence check and listing");
                ObjectLayerError::bucket_not_found(bucket)
            })
    }
}

fn log_failure(err: ObjectLayerError) -> ObjectLayerError {
    match err.trace() {
        Some(trace) => debug!(
            bucket = err.bucket(),
            object = err.object(),
            kind = ?err.kind(),
            at = %trace.location(),
            "anonymous backend call failed: {}",
            trace.inner()
        ),
        None => debug!(
            bucket = err.bucket(),
            object = err.object(),
            kind = ?err.kind(),
            "anonymous backend call failed: {}",
            err
        ),
    }
    err
}

/// Strip the quotes S3 puts around entity tags.
fn canonicalize_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

fn from_client_object_info(bucket: &str, stat: ObjectStat) -> ObjectLayerResult<ObjectInfo> {
    let size = u64::try_from(stat.size).map_err(|_| ObjectLayerError::Translation {
        bucket: bucket.to_string(),
        object: stat.key.clone(),
        reason: format!("negative object size {}", stat.size),
    })?;

    Ok(ObjectInfo {
        bucket: bucket.to_string(),
        name: stat.key,
        size,
        mod_time: stat.last_modified,
        etag: canonicalize_etag(stat.etag.as_deref().unwrap_or_default()),
        content_type: stat
            .content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
    })
}

fn from_client_list_result(
    bucket: &str,
    result: ListBucketResult,
) -> ObjectLayerResult<ListObjectsInfo> {
    let objects = result
        .contents
        .into_iter()
        .map(|stat| from_client_object_info(bucket, stat))
        .collect::<ObjectLayerResult<Vec<_>>>()?;

    Ok(ListObjectsInfo {
        is_truncated: result.is_truncated,
        next_marker: result.next_marker.unwrap_or_default(),
        objects,
        prefixes: result.common_prefixes,
    })
}
