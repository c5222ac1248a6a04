use axum::{Extension, Json, body::Bytes, extract::Path, http::StatusCode};
use log::{debug, warn};
use serde_json::{Value, json};

use crate::{
    inference::InferenceProvider,
    repository::GenerationRepository,
    tools::{ToolRegistry, ToolResponse},
};

/// Handles `GET /tools`, listing every tool with its description.
pub async fn list_tools<R, P>(
    Extension(registry): Extension<ToolRegistry<R, P>>,
) -> (StatusCode, Json<Value>)
where
    R: GenerationRepository + 'static,
    P: InferenceProvider + 'static,
{
    (
        StatusCode::OK,
        Json(json!({ "tools": registry.list_tools() })),
    )
}

/// Handles `POST /tools/{name}`.
///
/// The request body holds the tool arguments as a JSON object and may be left
/// empty for tools without required arguments. Tool failures still answer
/// `200 OK`; the body then has `"is_error": true` and the structured error:
///
/// ```json
/// {
///   "is_error": true,
///   "content": {
///     "error": { "kind": "generation_error", "message": "..." },
///     "model": "openai-community/gpt2",
///     "total_prompts": 2
///   }
/// }
/// ```
///
/// Only a body that is not JSON at all is rejected with `400 Bad Request`.
pub async fn call_tool<R, P>(
    Extension(registry): Extension<ToolRegistry<R, P>>,
    Path(name): Path<String>,
    body: Bytes,
) -> (StatusCode, Json<Value>)
where
    R: GenerationRepository + 'static,
    P: InferenceProvider + 'static,
{
    let args = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(v) => v,
            Err(e) => {
                warn!("Rejected non-JSON arguments for {}: {}", name, e);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": format!("invalid JSON body: {}", e) })),
                );
            }
        }
    };

    let response: ToolResponse = registry.call(&name, args).await;
    debug!("Tool {} finished (is_error: {})", name, response.is_error);
    (StatusCode::OK, Json(json!(response)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use tempfile::TempDir;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        router::tools_router,
        services::{CachePolicy, GenerationService, ModelSessionCache},
        test_utils::{FakeProvider, temp_repository},
    };

    async fn app() -> (TempDir, FakeProvider, axum::Router) {
        let (dir, repo) = temp_repository().await;
        let provider = FakeProvider::default();
        let sessions = ModelSessionCache::new(provider.clone(), CachePolicy::Reuse);
        let svc = GenerationService::new(repo, sessions, "default-model")
            .await
            .unwrap();
        let router = tools_router(ToolRegistry::new(Arc::new(svc)));
        (dir, provider, router)
    }

    async fn send(router: axum::Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = router.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_tools_endpoint() {
        let (_dir, _provider, router) = app().await;
        let req = Request::builder().uri("/tools").body(Body::empty()).unwrap();
        let (status, body) = send(router, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tools"].as_array().unwrap().len(), 4);
        assert_eq!(body["tools"][0]["name"], "single_generate_text");
    }

    #[tokio::test]
    async fn test_batch_endpoint_persists_batch() {
        let (_dir, _provider, router) = app().await;
        let (status, body) = send(
            router.clone(),
            post(
                "/tools/batch_generate_text",
                r#"{"prompts": ["Hi", "Bye"], "model_name": "m1", "format_prompts": false}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_error"], false);
        let batch_id = body["content"]["batch_id"].as_str().unwrap().to_string();

        let (_, read) = send(
            router,
            post(
                "/tools/read_results",
                &json!({ "batch_id": batch_id }).to_string(),
            ),
        )
        .await;
        assert_eq!(read["content"]["count"], 2);
        assert_eq!(read["content"]["results"][1]["response"], "m1:Bye");
    }

    #[tokio::test]
    async fn test_empty_body_is_accepted() {
        let (_dir, provider, router) = app().await;
        let req = Request::builder()
            .method("POST")
            .uri("/tools/get_model_info")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(router, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"]["status"], "no_model_loaded");
        assert_eq!(provider.load_count(), 0);
    }

    #[tokio::test]
    async fn test_tool_error_is_reported_in_band() {
        let (_dir, provider, router) = app().await;
        provider.fail_generation(true);
        let (status, body) = send(
            router,
            post("/tools/single_generate_text", r#"{"prompt": "Hi"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_error"], true);
        assert_eq!(body["content"]["error"]["kind"], "generation_error");
        assert_eq!(body["content"]["model"], "default-model");
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let (_dir, _provider, router) = app().await;
        let (status, _) = send(router, post("/tools/read_results", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
