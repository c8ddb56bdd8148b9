//! HTTP handlers for the anonymous read surface.

pub mod anonymous_handlers;
pub mod health_handlers;
