//! eq-gateway - Multi-tenant ingestion gateway
//!
//! Converts heterogeneous inputs (live audio over WebSocket, uploaded
//! audio files, raw text notes) into a cleaned, diarized transcript plus
//! a structured intelligence record, and fans the result out to the
//! stream and the event bus.
//!
//! Entry paths:
//! - `POST /text/clean` - text in, cleaned text out
//! - `POST /batch/process` - synchronous audio upload
//! - `POST /upload/init|complete`, `GET /upload/status/{id}` - presigned
//!   upload job state machine with a background worker
//! - `WS /listen` - live session, stitched and processed at close

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use axum::routing::get;
use axum::Router;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::services::cleaner::CleanerService;
use crate::services::intelligence::IntelligenceService;
use crate::services::llm::LlmClient;
use crate::services::object_store::ObjectStoreClient;
use crate::services::publisher::FanOutPublisher;
use crate::services::session_buffer::{InMemorySessionBuffer, SessionBufferStore};
use crate::services::transcriber::Transcriber;
use crate::services::upload_worker::UploadWorker;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub transcriber: Arc<Transcriber>,
    pub cleaner: Arc<CleanerService>,
    pub intelligence: Arc<IntelligenceService>,
    pub publisher: Arc<FanOutPublisher>,
    pub object_store: Option<Arc<ObjectStoreClient>>,
    pub session_buffer: Arc<dyn SessionBufferStore>,
    pub worker: Arc<UploadWorker>,
}

impl AppState {
    /// Wire up every service from configuration. Clients are built once
    /// and shared; features whose credentials are absent are disabled at
    /// construction with a warning, not at first use.
    pub fn new(db: PgPool, config: Config) -> Self {
        let config = Arc::new(config);

        let llm = Arc::new(LlmClient::new(
            config.openai_api_key.clone(),
            config.llm_model.clone(),
        ));
        let transcriber = Arc::new(Transcriber::new(config.deepgram_api_key.clone()));
        let cleaner = Arc::new(CleanerService::new(llm.clone()));
        let intelligence = Arc::new(IntelligenceService::new(llm, db.clone()));
        let publisher = Arc::new(FanOutPublisher::from_config(&config));
        let object_store = ObjectStoreClient::from_config(&config).map(Arc::new);
        let session_buffer: Arc<dyn SessionBufferStore> = Arc::new(InMemorySessionBuffer::new(
            Duration::from_secs(config.session_buffer_ttl_secs),
        ));

        let worker = Arc::new(UploadWorker::new(
            db.clone(),
            object_store.clone(),
            transcriber.clone(),
            cleaner.clone(),
            intelligence.clone(),
            publisher.clone(),
        ));

        Self {
            db,
            config,
            transcriber,
            cleaner,
            intelligence,
            publisher,
            object_store,
            session_buffer,
            worker,
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::text::text_routes())
        .merge(api::batch::batch_routes())
        .merge(api::upload::upload_routes())
        .merge(api::health::health_routes())
        .merge(api::ui::ui_routes())
        .route("/listen", get(api::listen::listen_handler))
        .with_state(state)
}
