//! Defines routes for the anonymous, read-only S3 surface.
//!
//! ## Structure
//! - **Bucket-level endpoints**
//!   - `GET    /{bucket}` — list objects (supports prefix, marker, delimiter, max-keys)
//!   - `HEAD   /{bucket}` — bucket existence
//!
//! - **Object-level endpoints**
//!   - `GET    /{bucket}/{*key}` — download object, honours `Range`
//!   - `HEAD   /{bucket}/{*key}` — retrieve metadata only
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    gateway::AnonGateway,
    handlers::{
        anonymous_handlers::{get_object, head_bucket, head_object, list_objects},
        health_handlers::{healthz, readyz},
    },
};
use axum::{Router, routing::get};

/// Build the router for all anonymous routes, carrying `AnonGateway` as state.
pub fn routes() -> Router<AnonGateway> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Object-level routes
        .route("/{bucket}/{*key}", get(get_object).head(head_object))
        // Bucket-level routes
        .route("/{bucket}", get(list_objects).head(head_bucket))
}
