pub mod errors;
mod tools;

use crate::inference::llm::{OnnxProvider, OnnxProviderConfig};
use crate::inference::InferenceProvider;
use crate::repository::GenerationRepository;
use crate::repository::sqlite::SQLiteGenerationRepository;
use crate::services::{CachePolicy, GenerationService, ModelSessionCache};
use crate::tools::ToolRegistry;
use crate::utils::get_env;

use axum::routing::{get, post};
use axum::{Extension, Router};
use log::info;
use std::sync::Arc;

use tools::{call_tool, list_tools};

const DEFAULT_MODEL_NAME_VAR: &str = "DEFAULT_MODEL_NAME";
const DEFAULT_MODEL_NAME: &str = "openai-community/gpt2";

/// Creates the API router backed by the SQLite ledger and the ONNX provider.
///
/// Storage location, default model, model directory and cache policy all come
/// from the environment. The model itself is loaded lazily on the first
/// generation call.
pub async fn get_router() -> errors::Result<Router> {
    let repository = SQLiteGenerationRepository::new().await?;
    let provider = OnnxProvider::new(OnnxProviderConfig::from_env());
    let sessions = ModelSessionCache::new(provider, CachePolicy::from_env());
    let default_model = get_env(DEFAULT_MODEL_NAME_VAR, DEFAULT_MODEL_NAME);

    let svc = GenerationService::new(repository, sessions, default_model).await?;
    info!("Tool router ready");
    Ok(tools_router(ToolRegistry::new(Arc::new(svc))))
}

/// Exposes a tool registry over HTTP: `GET /tools` and `POST /tools/{name}`.
pub fn tools_router<R, P>(registry: ToolRegistry<R, P>) -> Router
where
    R: GenerationRepository + 'static,
    P: InferenceProvider + 'static,
{
    // Routes first, then the layer that wraps them.
    Router::new()
        .route("/tools", get(list_tools::<R, P>))
        .route("/tools/{name}", post(call_tool::<R, P>))
        .layer(Extension(registry))
}
