//! HTTP gateway over the readshelf EPUB service.
//!
//! Every `/api/epub/*` route takes the book's `url` as a query parameter,
//! downloads and parses it for that request only, and answers with a
//! `{success, data}` / `{success, message}` envelope.

pub mod api;
pub mod config;

use std::sync::Arc;

use axum::Router;
use readshelf_core::error::EpubError;
use readshelf_core::EpubService;

use crate::config::ServerConfig;

/// Shared application state (service and config).
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EpubService>,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self, EpubError> {
        let service = Arc::new(EpubService::new(config.app.clone())?);
        Ok(Self { service, config })
    }
}

/// Build the `/api/epub` routes plus `/health`, with state.
pub fn api_routes(state: AppState) -> Router {
    api::routes(state)
}
