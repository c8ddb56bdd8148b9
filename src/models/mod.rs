//! Value objects the gateway hands to its callers.
//!
//! All of them are request-scoped: produced from a backend response, returned
//! once, never persisted. They serialize naturally as JSON via `serde`.

pub mod bucket;
pub mod list;
pub mod object;
