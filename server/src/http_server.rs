use axum::{
    extract::DefaultBodyLimit,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chatlens_core::client::CompletionBackend;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::session::SessionStoreRef;
use crate::storage::{ObjectSink, UploadDir};
use crate::{chat, generate, inbound, page, upload};

/// Application state shared with all routes
#[derive(Clone)]
pub struct AppState {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) backend: Arc<dyn CompletionBackend>,
    pub(crate) uploads: UploadDir,
    pub(crate) object_sink: Option<Arc<dyn ObjectSink>>,
    pub(crate) sessions: SessionStoreRef,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        backend: Arc<dyn CompletionBackend>,
        object_sink: Option<Arc<dyn ObjectSink>>,
        sessions: SessionStoreRef,
    ) -> Self {
        let uploads = UploadDir::new(config.uploads_dir.clone());
        Self {
            config: Arc::new(config),
            backend,
            uploads,
            object_sink,
            sessions,
        }
    }

    pub(crate) fn session_ttl(&self) -> chrono::Duration {
        // Capped at ten years to stay inside chrono's range
        let secs = self.config.session_ttl_secs.min(315_360_000) as i64;
        chrono::Duration::seconds(secs)
    }
}

/// Builds the router with every route and middleware layer
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(page::index))
        .route("/health", get(health))
        .route("/api/generate", post(generate::handle_generate))
        .route("/api/upload", post(upload::handle_upload))
        .route("/api/chat", post(chat::handle_chat))
        .route("/api/sessions", get(chat::list_sessions))
        .route(
            "/api/sessions/{id}",
            get(chat::get_session).delete(chat::delete_session),
        )
        .route("/api/mailgun-inbound", post(inbound::handle_inbound))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically drops expired sessions until the runtime shuts down
pub fn spawn_session_sweeper(sessions: SessionStoreRef, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = sessions.cleanup_expired_sessions().await {
                error!(error = %e, "Failed to clean up sessions");
            }
        }
    });
}

/// Start the HTTP server and run until Ctrl-C
pub async fn run_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    info!("Starting HTTP server on {}", addr);

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server failed: {}", e))
}

/// Health check handler
async fn health() -> impl IntoResponse {
    "chatlens is running"
}
