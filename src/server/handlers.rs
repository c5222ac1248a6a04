use std::sync::Arc;

use axum::{Extension, Json, http::StatusCode};
use serde::Serialize;
use serde_json::{Value, json};

use crate::server::{ServerState, ServerStatus};

#[derive(Serialize, Debug)]
struct AppStatusResponse {
    name: String,
    status: ServerStatus,
}

impl AppStatusResponse {
    fn from_state(state: &ServerState) -> Self {
        Self {
            name: state.name.clone(),
            status: state.status(),
        }
    }
}

// handlers
pub async fn healthz(Extension(state): Extension<Arc<ServerState>>) -> Json<Value> {
    Json(json!(AppStatusResponse::from_state(&state)))
}

pub async fn readyz(Extension(state): Extension<Arc<ServerState>>) -> (StatusCode, Json<Value>) {
    let body = AppStatusResponse::from_state(&state);
    if body.status != ServerStatus::Running {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!(body)));
    }
    (StatusCode::OK, Json(json!(body)))
}
