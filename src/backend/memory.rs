//! In-memory `ObjectClient` for tests.
//!
//! Records every call it receives, counts how many object streams have been
//! released, and can be told to fail specific operations.

use super::{
    BucketSummary, ClientError, ClientResult, ListBucketResult, ListObjectsParams, ObjectClient,
    ObjectReader, ObjectStat,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    collections::BTreeMap,
    io::{self, Cursor, SeekFrom},
    pin::Pin,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};
use tokio::io::{AsyncRead, AsyncSeek, ReadBuf};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    GetObject(String, String),
    StatObject(String, String),
    ListObjects(String, ListObjectsParams),
    BucketExists(String),
    ListBuckets,
}

#[derive(Clone, Debug)]
pub struct StoredObject {
    pub body: Bytes,
    pub stat: ObjectStat,
}

#[derive(Default)]
pub struct MemoryClient {
    pub buckets: Mutex<BTreeMap<String, DateTime<Utc>>>,
    pub objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    /// Listing handed back verbatim by `list_objects`, when set.
    pub listing: Mutex<Option<ListBucketResult>>,
    /// Buckets `bucket_exists` reports as present but `list_buckets` omits.
    pub unlisted: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<Call>>,
    pub released: Arc<AtomicUsize>,
    pub fail_with: Mutex<Option<(Call, fn() -> ClientError)>>,
    pub fail_seek: bool,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(self, name: &str, created: DateTime<Utc>) -> Self {
        self.buckets.lock().unwrap().insert(name.to_string(), created);
        self
    }

    pub fn with_object(self, bucket: &str, key: &str, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let stat = ObjectStat {
            key: key.to_string(),
            size: body.len() as i64,
            etag: Some(format!("\"{:x}\"", md5::compute(&body))),
            content_type: None,
            last_modified: Utc::now(),
        };
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), StoredObject { body, stat });
        self
    }

    /// Make `call` fail with the error `make` builds.
    pub fn fail_on(&self, call: Call, make: fn() -> ClientError) {
        *self.fail_with.lock().unwrap() = Some((call, make));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) -> ClientResult<()> {
        self.calls.lock().unwrap().push(call.clone());
        match &*self.fail_with.lock().unwrap() {
            Some((target, make)) if *target == call => Err(make()),
            _ => Ok(()),
        }
    }

    fn lookup(&self, bucket: &str, key: &str) -> ClientResult<StoredObject> {
        if !self.buckets.lock().unwrap().contains_key(bucket) {
            return Err(ClientError::no_such_bucket());
        }
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(ClientError::no_such_key)
    }
}

/// Object stream that bumps a counter when dropped.
pub struct TrackedReader {
    inner: Cursor<Bytes>,
    released: Arc<AtomicUsize>,
    fail_seek: bool,
}

impl Drop for TrackedReader {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl AsyncRead for TrackedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncSeek for TrackedReader {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        if self.fail_seek {
            return Err(io::Error::other("seek refused"));
        }
        Pin::new(&mut self.inner).start_seek(position)
    }

    fn poll_complete(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Pin::new(&mut self.inner).poll_complete(cx)
    }
}

#[async_trait]
impl ObjectClient for MemoryClient {
    async fn get_object(&self, bucket: &str, key: &str) -> ClientResult<ObjectReader> {
        self.record(Call::GetObject(bucket.into(), key.into()))?;
        let stored = self.lookup(bucket, key)?;
        Ok(Box::new(TrackedReader {
            inner: Cursor::new(stored.body),
            released: self.released.clone(),
            fail_seek: self.fail_seek,
        }))
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> ClientResult<ObjectStat> {
        self.record(Call::StatObject(bucket.into(), key.into()))?;
        Ok(self.lookup(bucket, key)?.stat)
    }

    async fn list_objects(
        &self,
        bucket: &str,
        params: &ListObjectsParams,
    ) -> ClientResult<ListBucketResult> {
        self.record(Call::ListObjects(bucket.into(), params.clone()))?;
        if !self.buckets.lock().unwrap().contains_key(bucket) {
            return Err(ClientError::no_such_bucket());
        }
        if let Some(listing) = self.listing.lock().unwrap().clone() {
            return Ok(listing);
        }
        let contents = self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(&params.prefix))
            .filter(|((_, k), _)| k.as_str() > params.marker.as_str())
            .map(|(_, stored)| stored.stat.clone())
            .collect();
        Ok(ListBucketResult {
            contents,
            ..Default::default()
        })
    }

    async fn bucket_exists(&self, bucket: &str) -> ClientResult<bool> {
        self.record(Call::BucketExists(bucket.into()))?;
        Ok(self.buckets.lock().unwrap().contains_key(bucket)
            || self.unlisted.lock().unwrap().iter().any(|b| b == bucket))
    }

    async fn list_buckets(&self) -> ClientResult<Vec<BucketSummary>> {
        self.record(Call::ListBuckets)?;
        Ok(self
            .buckets
            .lock()
            .unwrap()
            .iter()
            .map(|(name, created)| BucketSummary {
                name: name.clone(),
                creation_date: *created,
            })
            .collect())
    }
}
