//! Shared state handed to every handler.

use crate::{
    config::AppConfig,
    services::{auth_service::Authenticator, ingest_service::IngestService},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub ingest: IngestService,
    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        ingest: IngestService,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            ingest,
            authenticator,
        }
    }
}
