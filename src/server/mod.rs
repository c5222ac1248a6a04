pub mod handlers;

use axum::{Extension, Router, routing::get};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

use handlers::{healthz, readyz};

use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};
use tracing::Level;

#[derive(Serialize, Copy, Clone, PartialEq, Debug)]
pub enum ServerStatus {
    None,
    Starting,
    Stopped,
    Running,
}

/// Name and lifecycle status shared with the health handlers.
pub struct ServerState {
    pub name: String,
    status: RwLock<ServerStatus>,
}

impl ServerState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: RwLock::new(ServerStatus::None),
        }
    }

    pub fn status(&self) -> ServerStatus {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: ServerStatus) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }
}

pub struct Server {
    state: Arc<ServerState>,
    router: Router,
}

impl Default for Server {
    fn default() -> Self {
        let router = Router::new()
            .route("/healthz", get(healthz))
            .route("/readyz", get(readyz));
        Self {
            state: Arc::new(ServerState::new("generation-ledger")),
            router,
        }
    }
}

impl Server {
    pub fn add_router(&mut self, path: &str, router: Router) {
        self.router = self.router.clone().nest(path, router);
    }

    /// Full application router with state, request-id and tracing layers.
    pub fn app(&self) -> Router {
        self.router
            .clone()
            .layer(Extension(self.state.clone()))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .on_request(DefaultOnRequest::new().level(Level::INFO))
                    .make_span_with(
                        DefaultMakeSpan::new()
                            .level(Level::INFO)
                            .include_headers(false),
                    )
                    .on_response(
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .include_headers(false),
                    )
                    .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
            )
    }

    /// Binds `addr` and serves until Ctrl-C.
    pub async fn serve(self, addr: String) -> std::io::Result<()> {
        self.state.set_status(ServerStatus::Starting);
        let app = self.app();
        debug!("Initialized state");

        let listener = tokio::net::TcpListener::bind(addr.clone()).await?;
        self.state.set_status(ServerStatus::Running);
        info!("Server starting on {}", addr);

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await;
        self.state.set_status(ServerStatus::Stopped);
        match &result {
            Ok(_) => info!("Server shutdown gracefully"),
            Err(e) => warn!("Server stopped with error: {}", e),
        }
        result
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
