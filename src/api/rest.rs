// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`.  Request bodies are JSON; failures come
// back as `{"error": "...", "kind": "..."}` with:
//
//   400  malformed body / InvalidInput
//   422  InsufficientData / DegenerateRange
//   502  UpstreamFailure
//   500  TaskFailed
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use crate::app_state::{AppState, Timeframe};
use crate::error::AnalysisError;
use crate::market_data::PriceSeries;
use crate::pipeline::{PipelineSnapshot, PipelineState};
use crate::risk::{compute_leverage, LeverageInput, LeverageResult};
use crate::settings::{BollingerPatch, FibonacciPatch, IndicatorSettings, MacdPatch, RsiPatch};

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Status ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        // ── Indicator settings ──────────────────────────────────────
        .route("/api/v1/settings", get(get_settings))
        .route("/api/v1/settings/rsi", post(update_rsi))
        .route("/api/v1/settings/macd", post(update_macd))
        .route("/api/v1/settings/bollinger", post(update_bollinger))
        .route("/api/v1/settings/fibonacci", post(update_fibonacci))
        .route("/api/v1/settings/reset", post(reset_settings))
        // ── Pipeline inputs ─────────────────────────────────────────
        .route("/api/v1/series", post(submit_series))
        .route("/api/v1/refresh", post(refresh))
        // ── Risk calculator ─────────────────────────────────────────
        .route("/api/v1/leverage", post(leverage))
        // ── WebSocket (handled separately in ws module but mounted here) ─
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Error mapping
// =============================================================================

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "bad_request",
            message: message.into(),
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        let (status, kind) = match &err {
            AnalysisError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "invalid_input"),
            AnalysisError::InsufficientData { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_data")
            }
            AnalysisError::DegenerateRange { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "degenerate_range")
            }
            AnalysisError::UpstreamFailure { .. } => (StatusCode::BAD_GATEWAY, "upstream_failure"),
            AnalysisError::TaskFailed { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "task_failed")
            }
        };
        Self {
            status,
            kind,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        debug!(status = %self.status, kind = self.kind, error = %self.message, "request failed");
        let body = serde_json::json!({
            "error": self.message,
            "kind": self.kind,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    pipeline_state: PipelineState,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        pipeline_state: state.pipeline.state(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Full state snapshot
// =============================================================================

async fn full_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

// =============================================================================
// Indicator settings
// =============================================================================

#[derive(Serialize)]
struct SettingsResponse {
    version: u64,
    settings: IndicatorSettings,
}

fn settings_response(state: &AppState, settings: IndicatorSettings) -> Json<SettingsResponse> {
    Json(SettingsResponse {
        version: state.settings.version(),
        settings,
    })
}

async fn get_settings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    settings_response(&state, state.settings.snapshot())
}

/// One POST handler per settings family: parse the patch, apply it, answer
/// with the committed settings. The settings watcher schedules the
/// recomputation.
macro_rules! settings_handler {
    ($name:ident, $patch:ty, $update:ident) => {
        async fn $name(
            State(state): State<Arc<AppState>>,
            payload: Result<Json<$patch>, JsonRejection>,
        ) -> ApiResult<SettingsResponse> {
            let Json(patch) = payload?;
            let settings = state.settings.$update(patch)?;
            Ok(settings_response(&state, settings))
        }
    };
}

settings_handler!(update_rsi, RsiPatch, update_rsi);
settings_handler!(update_macd, MacdPatch, update_macd);
settings_handler!(update_bollinger, BollingerPatch, update_bollinger);
settings_handler!(update_fibonacci, FibonacciPatch, update_fibonacci);

async fn reset_settings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let settings = state.settings.reset();
    info!("indicator settings reset to defaults via API");
    settings_response(&state, settings)
}

// =============================================================================
// Pipeline inputs
// =============================================================================

#[derive(Serialize)]
struct PipelineResponse {
    token: u64,
    pipeline: PipelineSnapshot,
}

/// Report the outcome of the computation behind `token`.
///
/// If that computation itself failed, its error becomes the response; a
/// newer trigger having superseded it is not a failure.
fn pipeline_response(state: &AppState, token: u64) -> ApiResult<PipelineResponse> {
    let pipeline = state.pipeline.snapshot();
    if pipeline.state == PipelineState::Error && pipeline.token == token {
        if let Some(err) = pipeline.error {
            return Err(err.into());
        }
    }
    Ok(Json(PipelineResponse { token, pipeline }))
}

async fn submit_series(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PriceSeries>, JsonRejection>,
) -> ApiResult<PipelineResponse> {
    let Json(series) = payload?;
    info!(points = series.len(), "price series submitted via API");
    let token = state.pipeline.submit_series_async(series).await;
    pipeline_response(&state, token)
}

#[derive(Deserialize)]
struct RefreshRequest {
    asset_id: String,
    days: u32,
}

async fn refresh(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<PipelineResponse> {
    let Json(req) = payload?;
    let asset_id = req.asset_id.trim().to_lowercase();
    if asset_id.is_empty() {
        return Err(ApiError::bad_request("asset_id must not be empty"));
    }
    if req.days == 0 {
        return Err(ApiError::bad_request("days must be >= 1"));
    }

    let token = state
        .refresh(Timeframe {
            asset_id,
            days: req.days,
        })
        .await;
    pipeline_response(&state, token)
}

// =============================================================================
// Risk calculator
// =============================================================================

#[derive(Serialize)]
struct LeverageResponse {
    #[serde(flatten)]
    result: LeverageResult,
    advice: &'static str,
}

async fn leverage(payload: Result<Json<LeverageInput>, JsonRejection>) -> ApiResult<LeverageResponse> {
    let Json(input) = payload?;
    let result = compute_leverage(&input)?;
    let advice = result.risk_tier.advice();
    Ok(Json(LeverageResponse { result, advice }))
}
