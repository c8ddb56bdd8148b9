//! src/backend/local.rs
//!
//! LocalClient — read-only `ObjectClient` over an object store laid out on
//! this machine: SQLite holds bucket and object metadata, payloads live on
//! disk sharded beneath `base_path/{bucket}/{shard}/{shard}/{key}`.
//! Soft-deleted rows are never visible.

use super::{
    BucketSummary, ClientError, ClientResult, ListBucketResult, ListObjectsParams, ObjectClient,
    ObjectReader, ObjectStat,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::{FromRow, SqlitePool};
use std::{io, path::PathBuf, sync::Arc};
use tokio::fs::File;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");
const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const MAX_LIST_KEYS: usize = 1000;

#[derive(FromRow, Debug)]
struct BucketRow {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(FromRow, Debug)]
struct ObjectRow {
    key: String,
    content_type: Option<String>,
    size_bytes: i64,
    etag: Option<String>,
    last_modified: DateTime<Utc>,
}

impl From<ObjectRow> for ObjectStat {
    fn from(row: ObjectRow) -> Self {
        Self {
            key: row.key,
            size: row.size_bytes,
            etag: row.etag,
            content_type: row.content_type,
            last_modified: row.last_modified,
        }
    }
}

#[derive(Clone)]
pub struct LocalClient {
    /// Shared SQLite connection pool holding the metadata catalog.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

/// Apply the embedded catalog schema, one statement at a time.
pub async fn apply_schema(db: &SqlitePool) -> ClientResult<()> {
    let statements = SCHEMA
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}

impl LocalClient {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Reject keys that could escape the bucket directory.
    fn ensure_key_safe(key: &str) -> ClientResult<()> {
        let unsafe_key = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.split('/').any(|segment| segment == "..")
            || key.bytes().any(|b| b.is_ascii_control() || b == b'\\');

        if unsafe_key {
            return Err(ClientError::Response {
                code: "XMinioInvalidObjectName".into(),
                message: "Object name contains unsupported characters.".into(),
            });
        }
        Ok(())
    }

    /// S3-like bucket naming: 3-63 chars of `[a-z0-9.-]`, alphanumeric at
    /// both ends, no `..`, not an IPv4 address.
    fn ensure_bucket_name_safe(name: &str) -> ClientResult<()> {
        let len = name.len();
        let valid = (BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len)
            && name
                .chars()
                .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
            && !(name.starts_with('.')
                || name.ends_with('.')
                || name.starts_with('-')
                || name.ends_with('-'))
            && !(name.contains("..") || name.contains("-.") || name.contains(".-"))
            && !is_ipv4_like(name);

        if valid {
            Ok(())
        } else {
            Err(ClientError::Response {
                code: "InvalidBucketName".into(),
                message: "The specified bucket is not valid.".into(),
            })
        }
    }

    /// Two-level shard identifiers from MD5(bucket/key), as lowercase hex.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// base_path/bucket/{shard}/{shard}/{key}
    pub fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.base_path.clone();
        path.push(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn find_bucket(&self, bucket: &str) -> ClientResult<Option<BucketRow>> {
        Self::ensure_bucket_name_safe(bucket)?;
        let row = sqlx::query_as::<_, BucketRow>(
            "SELECT id, name, created_at FROM buckets WHERE name = ?",
        )
        .bind(bucket)
        .fetch_optional(&*self.db)
        .await?;
        Ok(row)
    }

    async fn fetch_bucket(&self, bucket: &str) -> ClientResult<BucketRow> {
        self.find_bucket(bucket)
            .await?
            .ok_or_else(ClientError::no_such_bucket)
    }

    async fn fetch_object(&self, bucket: &BucketRow, key: &str) -> ClientResult<ObjectRow> {
        sqlx::query_as::<_, ObjectRow>(
            "SELECT key, content_type, size_bytes, etag, last_modified
             FROM objects
             WHERE key = ? AND bucket_id = ? AND is_deleted = 0",
        )
        .bind(key)
        .bind(bucket.id)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(ClientError::no_such_key)
    }
}

#[async_trait]
impl ObjectClient for LocalClient {
    async fn get_object(&self, bucket: &str, key: &str) -> ClientResult<ObjectReader> {
        Self::ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        self.fetch_object(&bucket_rec, key).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        debug!("opening payload {}", file_path.display());
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                ClientError::no_such_key()
            } else {
                ClientError::Io(err)
            }
        })?;

        Ok(Box::new(file))
    }

    async fn stat_object(&self, bucket: &str, key: &str) -> ClientResult<ObjectStat> {
        Self::ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let row = self.fetch_object(&bucket_rec, key).await?;
        Ok(row.into())
    }

    /// ListObjects v1: keys after `marker`, filtered by `prefix`, in key
    /// order. With a delimiter, keys sharing the next path segment collapse
    /// into one common prefix, which counts once toward `max_keys`.
    async fn list_objects(
        &self,
        bucket: &str,
        params: &ListObjectsParams,
    ) -> ClientResult<ListBucketResult> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let max_keys = params.max_keys.clamp(1, MAX_LIST_KEYS);

        debug!(
            "listing bucket {} prefix={:?} marker={:?} delimiter={:?} max_keys={}",
            bucket, params.prefix, params.marker, params.delimiter, max_keys
        );

        let mut rows = sqlx::query_as::<_, ObjectRow>(
            "SELECT key, content_type, size_bytes, etag, last_modified
             FROM objects
             WHERE bucket_id = ? AND is_deleted = 0
               AND substr(key, 1, length(?)) = ?
               AND key > ?
             ORDER BY key ASC",
        )
        .bind(bucket_rec.id)
        .bind(&params.prefix)
        .bind(&params.prefix)
        .bind(&params.marker)
        .fetch(&*self.db);

        let mut result = ListBucketResult::default();
        let mut emitted = 0usize;
        let mut last_emitted: Option<String> = None;

        while let Some(row) = rows.try_next().await? {
            let grouped = if params.delimiter.is_empty() {
                None
            } else {
                compute_common_prefix(&row.key, &params.prefix, &params.delimiter)
            };

            if let Some(common) = grouped {
                // Keys under one prefix are contiguous, so only the last group can repeat.
                if result.common_prefixes.last() == Some(&common)
                    || (!params.marker.is_empty() && params.marker.starts_with(&common))
                {
                    continue;
                }
                if emitted == max_keys {
                    result.is_truncated = true;
                    break;
                }
                last_emitted = Some(common.clone());
                result.common_prefixes.push(common);
            } else {
                if emitted == max_keys {
                    result.is_truncated = true;
                    break;
                }
                last_emitted = Some(row.key.clone());
                result.contents.push(row.into());
            }
            emitted += 1;
        }

        if result.is_truncated {
            result.next_marker = last_emitted;
        }

        Ok(result)
    }

    async fn bucket_exists(&self, bucket: &str) -> ClientResult<bool> {
        Ok(self.find_bucket(bucket).await?.is_some())
    }

    async fn list_buckets(&self) -> ClientResult<Vec<BucketSummary>> {
        let rows = sqlx::query_as::<_, BucketRow>(
            "SELECT id, name, created_at FROM buckets ORDER BY name ASC",
        )
        .fetch_all(&*self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| BucketSummary {
                name: row.name,
                creation_date: row.created_at,
            })
            .collect())
    }
}

/// The synthetic common prefix `key` rolls up into, if any.
///
/// `key` must already start with `prefix`.
fn compute_common_prefix(key: &str, prefix: &str, delimiter: &str) -> Option<String> {
    let after_prefix = key.strip_prefix(prefix)?;
    let pos = after_prefix.find(delimiter)?;
    Some(format!(
        "{}{}",
        prefix,
        &after_prefix[..pos + delimiter.len()]
    ))
}

/// Dotted-decimal `1.2.3.4` form.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sqlx::sqlite::SqlitePoolOptions;
    use tokio::io::AsyncReadExt;

    struct Fixture {
        client: LocalClient,
        _dir: tempfile::TempDir,
    }

    async fn setup() -> Fixture {
        // One connection: every pooled connection to `:memory:` is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        apply_schema(&pool).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        Fixture {
            client: LocalClient::new(Arc::new(pool), dir.path()),
            _dir: dir,
        }
    }

    async fn insert_bucket(client: &LocalClient, name: &str, created_at: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO buckets (id, name, owner_id, region, created_at, versioning_enabled)
             VALUES (?, ?, ?, 'local', ?, 0)",
        )
        .bind(id)
        .bind(name)
        .bind(Uuid::new_v4())
        .bind(created_at)
        .execute(&*client.db)
        .await
        .unwrap();
        id
    }

    async fn insert_object(
        client: &LocalClient,
        bucket: &str,
        bucket_id: Uuid,
        key: &str,
        body: &[u8],
        deleted: bool,
    ) {
        sqlx::query(
            "INSERT INTO objects (id, bucket_id, key, filename, content_type, size_bytes,
                                  etag, storage_class, last_modified, version_id, is_deleted)
             VALUES (?, ?, ?, ?, 'text/plain', ?, ?, 'STANDARD', ?, NULL, ?)",
        )
        .bind(Uuid::new_v4())
        .bind(bucket_id)
        .bind(key)
        .bind(key.rsplit('/').next().unwrap())
        .bind(body.len() as i64)
        .bind(format!("{:x}", md5::compute(body)))
        .bind(Utc::now())
        .bind(deleted)
        .execute(&*client.db)
        .await
        .unwrap();

        let path = client.object_path(bucket, key);
        tokio::fs::create_dir_all(path.parent().unwrap())
            .await
            .unwrap();
        tokio::fs::write(&path, body).await.unwrap();
    }

    fn params(prefix: &str, marker: &str, delimiter: &str, max_keys: usize) -> ListObjectsParams {
        ListObjectsParams {
            prefix: prefix.into(),
            marker: marker.into(),
            delimiter: delimiter.into(),
            max_keys,
        }
    }

    #[tokio::test]
    async fn test_get_and_stat_object() {
        let fx = setup().await;
        let id = insert_bucket(&fx.client, "photos", Utc::now()).await;
        insert_object(&fx.client, "photos", id, "2025/a.jpg", b"hello world", false).await;

        let stat = fx.client.stat_object("photos", "2025/a.jpg").await.unwrap();
        assert_eq!(stat.size, 11);
        assert_eq!(stat.content_type.as_deref(), Some("text/plain"));

        let mut reader = fx.client.get_object("photos", "2025/a.jpg").await.unwrap();
        let mut body = String::new();
        reader.read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "hello world");
    }

    #[tokio::test]
    async fn test_missing_object_and_bucket_codes() {
        let fx = setup().await;
        let id = insert_bucket(&fx.client, "photos", Utc::now()).await;
        insert_object(&fx.client, "photos", id, "gone.txt", b"x", true).await;

        let err = fx.client.stat_object("photos", "gone.txt").await.unwrap_err();
        assert_eq!(err.code(), Some("NoSuchKey"));

        let err = fx.client.get_object("ghosts", "a.txt").await.err().unwrap();
        assert_eq!(err.code(), Some("NoSuchBucket"));

        let err = fx.client.stat_object("photos", "../etc/passwd").await.unwrap_err();
        assert_eq!(err.code(), Some("XMinioInvalidObjectName"));
    }

    #[tokio::test]
    async fn test_only_dot_dot_segments_are_rejected() {
        let fx = setup().await;
        let id = insert_bucket(&fx.client, "photos", Utc::now()).await;
        insert_object(&fx.client, "photos", id, "notes/a..b.txt", b"dots", false).await;

        let stat = fx.client.stat_object("photos", "notes/a..b.txt").await.unwrap();
        assert_eq!(stat.size, 4);

        for key in ["a/../b.txt", "a/..", "..", "a\\b"] {
            let err = fx.client.stat_object("photos", key).await.unwrap_err();
            assert_eq!(err.code(), Some("XMinioInvalidObjectName"), "key {key}");
        }
    }

    #[tokio::test]
    async fn test_missing_payload_is_no_such_key() {
        let fx = setup().await;
        let id = insert_bucket(&fx.client, "photos", Utc::now()).await;
        insert_object(&fx.client, "photos", id, "a.txt", b"abc", false).await;
        tokio::fs::remove_file(fx.client.object_path("photos", "a.txt"))
            .await
            .unwrap();

        let err = fx.client.get_object("photos", "a.txt").await.err().unwrap();
        assert_eq!(err.code(), Some("NoSuchKey"));
    }

    #[tokio::test]
    async fn test_bucket_exists_and_list_buckets() {
        let fx = setup().await;
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        insert_bucket(&fx.client, "zeta", created).await;
        insert_bucket(&fx.client, "alpha", created).await;

        assert!(fx.client.bucket_exists("alpha").await.unwrap());
        assert!(!fx.client.bucket_exists("missing").await.unwrap());

        let err = fx.client.bucket_exists("192.168.0.1").await.unwrap_err();
        assert_eq!(err.code(), Some("InvalidBucketName"));

        let buckets = fx.client.list_buckets().await.unwrap();
        let names: Vec<_> = buckets.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(buckets[0].creation_date, created);
    }

    #[tokio::test]
    async fn test_list_objects_prefix_and_pagination() {
        let fx = setup().await;
        let id = insert_bucket(&fx.client, "docs", Utc::now()).await;
        for key in ["a/1", "a/2", "a/3", "b/1", "a_literal"] {
            insert_object(&fx.client, "docs", id, key, b"x", false).await;
        }

        let page = fx.client.list_objects("docs", &params("a/", "", "", 2)).await.unwrap();
        let keys: Vec<_> = page.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a/1", "a/2"]);
        assert!(page.is_truncated);
        assert_eq!(page.next_marker.as_deref(), Some("a/2"));

        let page = fx
            .client
            .list_objects("docs", &params("a/", "a/2", "", 2))
            .await
            .unwrap();
        let keys: Vec<_> = page.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a/3"]);
        assert!(!page.is_truncated);
        assert!(page.next_marker.is_none());
    }

    #[tokio::test]
    async fn test_list_objects_delimiter_groups_prefixes() {
        let fx = setup().await;
        let id = insert_bucket(&fx.client, "docs", Utc::now()).await;
        for key in ["a/1", "a/2", "b/1", "c.txt", "d/x/y"] {
            insert_object(&fx.client, "docs", id, key, b"x", false).await;
        }

        let page = fx.client.list_objects("docs", &params("", "", "/", 1000)).await.unwrap();
        assert_eq!(page.common_prefixes, vec!["a/", "b/", "d/"]);
        let keys: Vec<_> = page.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["c.txt"]);

        let page = fx.client.list_objects("docs", &params("", "", "/", 2)).await.unwrap();
        assert_eq!(page.common_prefixes, vec!["a/", "b/"]);
        assert_eq!(page.next_marker.as_deref(), Some("b/"));

        let page = fx.client.list_objects("docs", &params("", "b/", "/", 2)).await.unwrap();
        assert_eq!(page.common_prefixes, vec!["d/"]);
        let keys: Vec<_> = page.contents.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["c.txt"]);
        assert!(!page.is_truncated);
    }

    #[test]
    fn test_compute_common_prefix() {
        assert_eq!(
            compute_common_prefix("photos/2025/a.jpg", "photos/", "/").as_deref(),
            Some("photos/2025/")
        );
        assert_eq!(compute_common_prefix("photos/a.jpg", "photos/", "/"), None);
        assert_eq!(compute_common_prefix("other/a.jpg", "photos/", "/"), None);
    }
}
