//! Represents a logical bucket — a top-level container for objects.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A bucket as seen through the gateway. Never cached.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct BucketInfo {
    pub name: String,

    /// When this bucket was created.
    pub created: DateTime<Utc>,
}
