use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use tracing::info;

use crate::auth::{Gatekeeper, Principal, Scope};
use crate::error::GatewayError;
use crate::normalize::{
    canonicalize_chat, canonicalize_embeddings, parse_chat, parse_embedding, to_wire_json,
    ValidationError,
};
use crate::protocol::{ErrorBody, ErrorResponse, HealthResponse, ModelEntry, ModelList};
use crate::provider::{CallPolicy, Capability};
use crate::registry::ProviderRegistry;

use super::middleware::{bearer_token, is_json};

/// Shared application state.
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub gatekeeper: Gatekeeper,
    pub call_policy: CallPolicy,
    /// `mock` or `live`.
    pub mode: String,
}

/// Health check handler.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        mode: state.mode.clone(),
    })
}

/// Model catalogue. Any valid key may list models.
pub async fn models(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ModelList>, GatewayError> {
    state.gatekeeper.require(bearer_token(&headers), None).await?;

    Ok(Json(ModelList {
        object: "list",
        data: state
            .registry
            .models()
            .map(|m| ModelEntry {
                id: m.id.clone(),
                object: "model",
                name: m.name.clone(),
                owned_by: m.adapter.name().to_string(),
                capabilities: m.capabilities.names(),
            })
            .collect(),
    }))
}

/// Chat completions endpoint.
pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    let principal = authorize(&state, &headers, Scope::Inference).await?;
    require_json(&headers)?;

    let request = parse_chat(&body)?;
    let model = state.registry.resolve(&request.model, Capability::Chat)?;
    let adapter = model.adapter.clone();

    let completion = state
        .call_policy
        .run("chat", || adapter.chat(&request))
        .await?;
    let completion = canonicalize_chat(completion)?;

    info!(
        owner = %principal.owner,
        key_id = %principal.key_id,
        model = %request.model,
        provider = adapter.name(),
        end_user = request.user.as_deref().unwrap_or(""),
        choices = completion.choices.len(),
        total_tokens = completion.usage.total_tokens,
        "chat completion"
    );
    Ok(Json(to_wire_json(completion.into())?))
}

/// Embeddings endpoint.
pub async fn embeddings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, GatewayError> {
    let principal = authorize(&state, &headers, Scope::Embedding).await?;
    require_json(&headers)?;

    let request = parse_embedding(&body)?;
    let model = state
        .registry
        .resolve(&request.model, Capability::Embedding)?;
    let adapter = model.adapter.clone();

    let result = state
        .call_policy
        .run("embed", || adapter.embed(&request))
        .await?;
    let result = canonicalize_embeddings(result, request.inputs.len())?;

    info!(
        owner = %principal.owner,
        key_id = %principal.key_id,
        model = %request.model,
        provider = adapter.name(),
        inputs = request.inputs.len(),
        "embeddings"
    );
    Ok(Json(to_wire_json(result.into())?))
}

/// Unknown path.
pub async fn not_found() -> Response {
    routing_error(StatusCode::NOT_FOUND, "not_found", "no such endpoint")
}

/// Known path, wrong method.
pub async fn method_not_allowed() -> Response {
    routing_error(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        "method not allowed for this endpoint",
    )
}

async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    scope: Scope,
) -> Result<Principal, GatewayError> {
    Ok(state
        .gatekeeper
        .require(bearer_token(headers), Some(scope))
        .await?)
}

fn require_json(headers: &HeaderMap) -> Result<(), ValidationError> {
    if is_json(headers) {
        Ok(())
    } else {
        Err(ValidationError::single(
            "content-type",
            "must be application/json",
        ))
    }
}

fn routing_error(status: StatusCode, code: &'static str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorBody {
                code,
                message: message.to_string(),
                details: Vec::new(),
            },
        }),
    )
        .into_response()
}
