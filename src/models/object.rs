//! Metadata about one object, as the gateway reports it.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Content type reported when the backend does not know one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Result of a stat or list query about a single object.
///
/// Built fresh from the backend's metadata on every call. Within one response
/// an object is identified by `(bucket, name)` and nothing else.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    /// Bucket the object was requested from.
    pub bucket: String,

    /// Object key (path-like identifier within the bucket).
    pub name: String,

    /// Size in bytes.
    pub size: u64,

    /// When the object was last modified.
    pub mod_time: DateTime<Utc>,

    /// Entity tag without surrounding quotes.
    pub etag: String,

    /// MIME type.
    pub content_type: String,
}
