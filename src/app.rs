use crate::adapter::CLIENT_USER_AGENT;
use crate::credentials::{KeyRotation, RandomRotation};
use crate::error::{AppError, AppResult};
use crate::usage::{LogUsageSink, UsageSink};
use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::{Arc, Once, OnceLock};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub http: reqwest::Client,
    pub metrics: PrometheusHandle,
    pub usage: Arc<dyn UsageSink>,
    pub rotation: Arc<dyn KeyRotation>,
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_ERROR: OnceLock<AppError> = OnceLock::new();
static METRICS_INIT: Once = Once::new();

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_TOKENS: u32 = 2_000;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: String,
    /// Default upstream base URL; overridable per request.
    pub base_url: String,
    /// Default model; `None` defers to the matched provider's catalog.
    pub model: Option<String>,
    /// Comma-separated credential pool for requests without an explicit key.
    pub api_keys: String,
    pub request_timeout_ms: u64,
    pub max_tokens: u32,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let listen = std::env::var("GATEWAY_LISTEN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let base_url = std::env::var("OPENAI_API_BASE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("OPENAI_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let api_keys = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        let request_timeout_ms = env_number("REQUEST_TIMEOUT", DEFAULT_TIMEOUT_MS);
        let max_tokens = env_number("MAX_TOKENS", DEFAULT_MAX_TOKENS);
        Self {
            listen,
            base_url,
            model,
            api_keys,
            request_timeout_ms,
            max_tokens,
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_keys.split(',').any(|k| !k.trim().is_empty())
    }

    /// First key of the configured pool, for diagnostics endpoints.
    pub fn first_api_key(&self) -> Option<&str> {
        self.api_keys
            .split(',')
            .map(str::trim)
            .find(|k| !k.is_empty())
    }
}

fn env_number<T: std::str::FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("{name}={raw} is not a number, using default {default}");
                default
            }
        },
        _ => default,
    }
}

/// Startup sanity check of the configuration. Warnings are logged and never
/// abort; a missing credential pool is only fatal to requests that also
/// bring no key of their own.
pub fn check_environment(runtime: &RuntimeConfig) {
    if !runtime.has_api_key() {
        tracing::warn!(
            "OPENAI_API_KEY is not configured; requests must supply their own credential"
        );
    } else if let Some(key) = runtime.first_api_key() {
        if crate::credentials::validate_credential(key, &runtime.base_url).is_err() {
            tracing::warn!("configured API key format may be invalid for {}", runtime.base_url);
        }
    }
    if runtime.request_timeout_ms < 1_000 {
        tracing::warn!(
            "REQUEST_TIMEOUT={} is below 1000 ms; upstream calls will be cut very short",
            runtime.request_timeout_ms
        );
    }
    if runtime.max_tokens < 100 {
        tracing::warn!("MAX_TOKENS={} is unusually small", runtime.max_tokens);
    }
    if runtime.model.is_none() {
        tracing::info!("OPENAI_MODEL not set, deferring to the provider default");
    }
}

pub fn load_state() -> AppResult<AppState> {
    load_state_with_runtime(RuntimeConfig::from_env())
}

pub fn load_state_with_runtime(runtime: RuntimeConfig) -> AppResult<AppState> {
    load_state_with_parts(runtime, Arc::new(LogUsageSink), Arc::new(RandomRotation))
}

pub fn load_state_with_parts(
    runtime: RuntimeConfig,
    usage: Arc<dyn UsageSink>,
    rotation: Arc<dyn KeyRotation>,
) -> AppResult<AppState> {
    let http = reqwest::Client::builder()
        .user_agent(CLIENT_USER_AGENT)
        .build()
        .map_err(|err| {
            AppError::new(
                axum::http::StatusCode::BAD_REQUEST,
                "http_client_init_failed",
                err.to_string(),
            )
        })?;

    let metrics = init_metrics()?;

    Ok(AppState {
        runtime: Arc::new(runtime),
        http,
        metrics,
        usage,
        rotation,
    })
}

fn init_metrics() -> AppResult<PrometheusHandle> {
    METRICS_INIT.call_once(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(err) => {
                let _ = METRICS_ERROR.set(AppError::new(
                    axum::http::StatusCode::BAD_REQUEST,
                    "metrics_init_failed",
                    err.to_string(),
                ));
            }
        }
    });

    if let Some(err) = METRICS_ERROR.get() {
        return Err(err.clone());
    }
    METRICS_HANDLE.get().cloned().ok_or_else(|| {
        AppError::new(
            axum::http::StatusCode::BAD_REQUEST,
            "metrics_init_failed",
            "metrics recorder not available",
        )
    })
}

pub fn build_app(state: AppState) -> Router {
    Router::<AppState>::new()
        .route("/v1/generate", post(crate::handlers::generate))
        .route("/v1/validate-key", get(crate::handlers::validate_key))
        .route("/healthz", get(crate::handlers::healthz))
        .route("/metrics", get(crate::handlers::metrics))
        .with_state(state)
        .layer(SetRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
        ))
        .layer(TraceLayer::new_for_http())
}
