//! # Operator API
//!
//! An `axum` HTTP surface over the composite [`Backend`], shaped after the
//! Alertmanager v2 API. Errors are rendered as `{"error": "<message>"}`.

use crate::core::{
    AlertConfiguration, AlertQuery, Backend, OrgId, PostableAlert, PostableSilence,
    TestReceiversConfig, TestTemplatesConfig,
};
use crate::errors::BackendError;
use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, trace};

/// State shared across handlers.
pub struct ApiState {
    pub backend: Arc<dyn Backend>,
    pub org_id: OrgId,
}

/// Builds the API router.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/-/ready", get(ready))
        .route("/api/v2/status", get(get_status))
        .route("/api/v2/silences", get(list_silences).post(create_silence))
        .route("/api/v2/silence/{id}", get(get_silence).delete(delete_silence))
        .route("/api/v2/alerts", get(get_alerts).post(put_alerts))
        .route("/api/v2/alerts/groups", get(get_alert_groups))
        .route("/api/v1/receivers", get(get_receivers))
        .route("/api/v1/receivers/test", post(test_receivers))
        .route("/api/v1/templates/test", post(test_template))
        .route("/api/v1/config", post(save_config))
        .with_state(state)
}

/// Serves the API until the shutdown signal fires.
pub struct ApiServer {
    listener: TcpListener,
    state: Arc<ApiState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ApiServer {
    pub fn new(listener: TcpListener, state: Arc<ApiState>, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            listener,
            state,
            shutdown_rx,
        }
    }

    pub fn run(self) -> impl Future<Output = ()> {
        let app = router(self.state);
        let listener = self.listener;
        let mut shutdown_rx = self.shutdown_rx;

        async move {
            let shutdown = async move {
                let _ = shutdown_rx.changed().await;
                trace!("API server received shutdown signal.");
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("API server error: {}", e);
            }
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        let message = err.to_string();
        match err {
            BackendError::SilenceNotFound(_) => ApiError::NotFound(message),
            BackendError::InvalidSilence(_)
            | BackendError::InvalidConfig(_)
            | BackendError::InvalidAlert(_)
            | BackendError::InvalidFilter(_) => ApiError::BadRequest(message),
            BackendError::NotReady => ApiError::Unavailable(message),
            BackendError::UnexpectedStatus { status: 400, .. } => ApiError::BadRequest(message),
            BackendError::UnexpectedStatus { status: 404, .. } => ApiError::NotFound(message),
            _ => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Query parsing
// ============================================================================

fn query_pairs(raw: Option<String>) -> Vec<(String, String)> {
    raw.map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn parse_bool(name: &str, value: &str) -> ApiResult<bool> {
    value
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid value for '{}': {}", name, value)))
}

fn filters(pairs: &[(String, String)]) -> Vec<String> {
    pairs
        .iter()
        .filter(|(k, _)| k == "filter")
        .map(|(_, v)| v.clone())
        .collect()
}

fn alert_query(raw: Option<String>) -> ApiResult<AlertQuery> {
    let pairs = query_pairs(raw);
    let mut query = AlertQuery {
        filter: filters(&pairs),
        ..Default::default()
    };
    for (key, value) in &pairs {
        match key.as_str() {
            "active" => query.active = parse_bool(key, value)?,
            "silenced" => query.silenced = parse_bool(key, value)?,
            "inhibited" => query.inhibited = parse_bool(key, value)?,
            "receiver" => query.receiver = Some(value.clone()),
            _ => {}
        }
    }
    Ok(query)
}

// ============================================================================
// Handlers
// ============================================================================

async fn ready(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    if state.backend.ready() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
    }
}

async fn get_status(State(state): State<Arc<ApiState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.backend.get_status().await?))
}

async fn list_silences(
    State(state): State<Arc<ApiState>>,
    RawQuery(raw): RawQuery,
) -> ApiResult<impl IntoResponse> {
    let filter = filters(&query_pairs(raw));
    Ok(Json(state.backend.list_silences(&filter).await?))
}

async fn create_silence(
    State(state): State<Arc<ApiState>>,
    Json(silence): Json<PostableSilence>,
) -> ApiResult<impl IntoResponse> {
    let id = state.backend.create_silence(&silence).await?;
    Ok(Json(json!({ "silenceID": id })))
}

async fn get_silence(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.backend.get_silence(&id).await?))
}

async fn delete_silence(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.backend.delete_silence(&id).await?;
    Ok(StatusCode::OK)
}

async fn get_alerts(
    State(state): State<Arc<ApiState>>,
    RawQuery(raw): RawQuery,
) -> ApiResult<impl IntoResponse> {
    let query = alert_query(raw)?;
    Ok(Json(state.backend.get_alerts(&query).await?))
}

async fn put_alerts(
    State(state): State<Arc<ApiState>>,
    Json(alerts): Json<Vec<PostableAlert>>,
) -> ApiResult<StatusCode> {
    state.backend.put_alerts(&alerts).await?;
    Ok(StatusCode::OK)
}

async fn get_alert_groups(
    State(state): State<Arc<ApiState>>,
    RawQuery(raw): RawQuery,
) -> ApiResult<impl IntoResponse> {
    let query = alert_query(raw)?;
    Ok(Json(state.backend.get_alert_groups(&query).await?))
}

async fn get_receivers(State(state): State<Arc<ApiState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.backend.get_receivers().await?))
}

async fn test_receivers(
    State(state): State<Arc<ApiState>>,
    Json(config): Json<TestReceiversConfig>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.backend.test_receivers(&config).await?))
}

async fn test_template(
    State(state): State<Arc<ApiState>>,
    Json(config): Json<TestTemplatesConfig>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.backend.test_template(&config).await?))
}

/// Saves and applies a raw configuration document.
async fn save_config(State(state): State<Arc<ApiState>>, body: String) -> ApiResult<impl IntoResponse> {
    if serde_json::from_str::<serde_json::Value>(&body).is_err() {
        return Err(ApiError::BadRequest("configuration must be a JSON document".to_string()));
    }
    let config = AlertConfiguration::new(state.org_id, body);
    state.backend.save_and_apply_config(&config).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "message": "configuration saved" }))))
}
