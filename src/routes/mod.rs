//! Router wiring.

pub mod routes;
