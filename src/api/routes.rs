use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::{CounterFallback, FailurePolicy};
use crate::db::CounterStore;
use crate::error::AppError;
use crate::rates::RateService;
use crate::types::{Action, CounterSnapshot, RateBundle};

#[derive(Clone)]
pub struct ApiState {
    pub counters: CounterStore,
    pub rates: Arc<RateService>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
    pub failure_policy: FailurePolicy,
    pub counter_fallback: CounterFallback,
    pub fallback_start_rate: f64,
}

pub fn router(state: ApiState) -> Router {
    let counters = get(get_counters).post(post_counters).options(preflight);
    let exchange = get(get_exchange).options(preflight);

    Router::new()
        .route("/counters", counters.clone())
        .route("/.netlify/functions/counters", counters)
        .route("/exchange", exchange.clone())
        .route("/.netlify/functions/exchange", exchange)
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ActionQuery {
    pub action: Option<String>,
}

#[derive(Deserialize)]
pub struct ExchangeQuery {
    pub start_date: Option<String>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct CounterResponse {
    #[serde(flatten)]
    pub counters: CounterSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct RateFallbackResponse {
    #[serde(flatten)]
    pub rates: RateBundle,
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub database_configured: bool,
    pub rate_provider: &'static str,
    pub rate_cache_age_secs: Option<u64>,
    pub last_refresh_error: Option<String>,
    pub counter_fallbacks: u64,
    pub rate_failures: u64,
}

#[derive(Serialize)]
pub struct LatencyResponse {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// CORS preflight: empty success.
async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn get_counters(State(state): State<ApiState>) -> Response {
    counters_response(&state, Action::None, false).await
}

async fn post_counters(
    State(state): State<ApiState>,
    Query(params): Query<ActionQuery>,
) -> Response {
    let action = Action::parse(params.action.as_deref());
    if !action.is_mutation() {
        debug!(raw = ?params.action, "POST without a known action, returning current values");
    }
    counters_response(&state, action, true).await
}

async fn counters_response(state: &ApiState, action: Action, is_post: bool) -> Response {
    match state.counters.apply_action_and_fetch(action).await {
        Ok(counters) => {
            let body = CounterResponse {
                counters,
                error: None,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            log_backend_failure("counters", &e);
            debug!(action = %action, "serving counter fallback");
            state.health.inc_counter_fallbacks();

            // An unconfigured read is a normal read of the fallback values.
            let status = match state.failure_policy {
                FailurePolicy::Mask => StatusCode::OK,
                FailurePolicy::Surface if !is_post && !state.counters.is_configured() => {
                    StatusCode::OK
                }
                FailurePolicy::Surface => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let body = CounterResponse {
                counters: CounterSnapshot::fallback(state.counter_fallback),
                error: Some(e.to_string()),
            };
            (status, Json(body)).into_response()
        }
    }
}

async fn get_exchange(
    State(state): State<ApiState>,
    Query(params): Query<ExchangeQuery>,
) -> Response {
    match state.rates.get_rates(params.start_date.as_deref()).await {
        Ok(bundle) => (StatusCode::OK, Json(bundle)).into_response(),
        Err(e) => {
            state.health.inc_rate_failures();
            log_backend_failure(state.rates.provider_name(), &e);
            match state.failure_policy {
                FailurePolicy::Mask => {
                    let body = RateFallbackResponse {
                        rates: RateBundle::fallback(state.fallback_start_rate),
                        error: e.to_string(),
                    };
                    (StatusCode::OK, Json(body)).into_response()
                }
                FailurePolicy::Surface => e.into_response(),
            }
        }
    }
}

/// An unreachable or unconfigured backend is an operational condition; anything
/// else (bad upstream payloads, schema errors) is logged as an error.
fn log_backend_failure(backend: &str, e: &AppError) {
    if e.is_backend_unavailable() {
        warn!(backend, "backend unavailable, degrading: {e}");
    } else {
        error!(backend, "backend returned unusable data, degrading: {e}");
    }
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        database_configured: state.counters.is_configured(),
        rate_provider: state.rates.provider_name(),
        rate_cache_age_secs: state.rates.cache_age().map(|d| d.as_secs()),
        last_refresh_error: state.rates.last_error(),
        counter_fallbacks: state.health.counter_fallbacks(),
        rate_failures: state.health.rate_failures(),
    })
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencyResponse> {
    let (p50_ms, p95_ms, p99_ms) = state.latency.percentiles_ms();
    Json(LatencyResponse {
        samples: state.latency.len(),
        p50_ms,
        p95_ms,
        p99_ms,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
