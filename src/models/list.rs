//! One page of an object listing.

use super::object::ObjectInfo;
use serde::Serialize;

/// Objects and common prefixes returned by a single list call.
///
/// `objects` keeps the backend's order; the gateway never re-sorts it.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ListObjectsInfo {
    /// More entries are available past `next_marker`.
    pub is_truncated: bool,

    /// Marker to pass back for the next page, when truncated.
    pub next_marker: String,

    pub objects: Vec<ObjectInfo>,

    /// Synthetic entries grouping keys that share a prefix up to the delimiter.
    pub prefixes: Vec<String>,
}
