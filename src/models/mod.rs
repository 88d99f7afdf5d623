//! Core data types for the image store.
//!
//! Fingerprints identify stored images; identities annotate the requests that
//! create and delete them.

pub mod fingerprint;
pub mod identity;
