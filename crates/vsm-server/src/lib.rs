//! VSM HTTP server.
//!
//! Wires the core library, the configured data store, and the virtual key
//! store backends into a running Axum server serving the JSON API at
//! `/v1/*`.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;
