//! Web layer module
//!
//! HTTP interface for the ingest supervisor. The media server's publish hooks
//! arrive as `ingest/start` and `ingest/end` calls; everything else is read
//! access to live metrics, sessions and recorded files, plus stream key
//! management.

use anyhow::Result;
use axum::{
    Router,
    routing::{get, post},
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::info;

use crate::{
    config::Config,
    services::{MetricsStore, SessionSupervisor, StreamKeyRegistry, VodStorage},
};

pub mod api;
pub mod handlers;
pub mod responses;

pub use responses::{ApiResponse, handle_error, handle_result};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub supervisor: Arc<SessionSupervisor>,
    pub metrics_store: MetricsStore,
    pub vod_storage: VodStorage,
    pub stream_keys: StreamKeyRegistry,
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", state.config.web.host, state.config.web.port).parse()?;
        let app = Self::create_router(state);
        Ok(Self { app, addr })
    }

    /// Create the router with all routes and middleware
    pub fn create_router(state: AppState) -> Router {
        let media_dir = state.config.storage.media_path.clone();

        Router::new()
            .route("/health", get(handlers::health::health_check))
            .nest("/api/v1", Self::api_v1_routes())
            // HLS segments written by the media server
            .nest_service("/media", ServeDir::new(media_dir))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    fn api_v1_routes() -> Router<AppState> {
        Router::new()
            // Media server publish hooks
            .route("/ingest/start", post(api::ingest::ingest_start))
            .route("/ingest/end", post(api::ingest::ingest_end))
            .route("/sessions", get(api::ingest::list_sessions))
            .route("/sessions/{stream_id}", get(api::ingest::get_session))
            // Stream keys
            .route(
                "/streams/keys",
                get(api::stream_keys::list_keys).post(api::stream_keys::create_key),
            )
            .route(
                "/streams/keys/{key}",
                get(api::stream_keys::get_key).delete(api::stream_keys::delete_key),
            )
            .route("/streams/keys/{key}/settings", post(api::stream_keys::update_settings))
            .route("/streams/keys/{key}/regenerate", post(api::stream_keys::regenerate_key))
            // Live metrics
            .route("/streams/{stream_id}/metrics", get(api::streams::stream_metrics))
            .route("/streams/{stream_id}/status", get(api::streams::stream_status))
            .route("/metrics", get(api::streams::all_metrics))
            .route("/metrics/events", get(api::metrics_events::metrics_events_stream))
            // Recordings
            .route("/vod", get(api::vod::list_recordings))
            .route("/vod/{filename}", get(api::vod::download_recording))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(&self.addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", self.addr, e))?;
        info!("Web server listening on {}", self.addr);

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}
