use crate::app::AppState;
use crate::credentials;
use crate::error::{AppError, AppResult};
use crate::registry;
use crate::request::GenerationRequest;
use crate::session;
use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde_json::json;

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

/// Build a `GenerationRequest` from the posted body, drive one session, and
/// stream its text straight through. Everything interesting happens in
/// `session::start`; this layer only translates errors to status codes.
pub async fn generate(
    State(state): State<AppState>,
    Json(req): Json<GenerationRequest>,
) -> AppResult<Response> {
    if req.messages.iter().all(|m| m.content.trim().is_empty()) {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "messages_required",
            "at least one non-empty message is required",
        ));
    }

    let (_handle, stream) = session::start(&state, req).await?;

    let resp = (
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response();
    Ok(resp)
}

/// Report on the configured environment credential without ever echoing it.
pub async fn validate_key(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let Some(key) = state.runtime.first_api_key() else {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "no_api_key_configured",
            "OPENAI_API_KEY environment variable is missing",
        ));
    };

    let base_url = &state.runtime.base_url;
    let profile = registry::detect_provider(base_url);
    let is_valid = credentials::validate_credential(key, base_url).is_ok();

    Ok(Json(json!({
        "validation": {
            "is_valid": is_valid,
            "provider": profile.map(|p| p.name).unwrap_or("Custom"),
            "expected_format": profile.map(|p| p.key_format_hint).unwrap_or("10+ characters"),
        },
        "key_info": {
            "masked_key": credentials::mask_key(key),
            "length": key.chars().count(),
        },
        "config": {
            "base_url": base_url,
            "detected_provider": profile.map(|p| p.id),
            "models": profile.map(|p| p.models).unwrap_or(&[]),
        }
    })))
}

pub async fn healthz(State(state): State<AppState>) -> Response {
    let runtime = &state.runtime;
    let has_api_key = runtime.has_api_key();
    let body = json!({
        "status": if has_api_key { "healthy" } else { "unhealthy" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "config": {
            "has_api_key": has_api_key,
            "base_url": runtime.base_url,
            "model": runtime.model,
            "request_timeout_ms": runtime.request_timeout_ms,
        }
    });
    if has_api_key {
        (StatusCode::OK, Json(body)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}
