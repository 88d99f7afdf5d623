pub mod auth_service;
pub mod image_store;
pub mod ingest_service;
pub mod normalizer;
