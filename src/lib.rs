//! taswira: an authenticated, content-addressed image store.
//!
//! Uploads are normalized to RGBA8 PNG and stored under the XXH3-128
//! fingerprint of the normalized bytes, so the same picture is only ever
//! stored once regardless of how it was encoded.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
