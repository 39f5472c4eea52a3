//! HTTP route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<ApiState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::engine::{Tally, WagerExecutor};
use crate::strategy::StakeSizer;
use crate::types::{Direction, Forecast, OutcomeRecord, WagerError, WagerResult, WagerStatus};

/// Default and maximum page sizes for `/api/history`.
pub const DEFAULT_HISTORY_LIMIT: u32 = 10;
pub const MAX_HISTORY_LIMIT: u32 = 500;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct ApiState {
    pub executor: Arc<WagerExecutor>,
    pub sizer: StakeSizer,
    pub lean_threshold: f64,
    pub tally: RwLock<Tally>,
    pub started_at: DateTime<Utc>,
}

impl ApiState {
    pub fn new(
        executor: Arc<WagerExecutor>,
        sizer: StakeSizer,
        lean_threshold: f64,
        opening_balance: Option<Decimal>,
    ) -> Self {
        Self {
            executor,
            sizer,
            lean_threshold,
            tally: RwLock::new(Tally::new(opening_balance)),
            started_at: Utc::now(),
        }
    }
}

pub type AppState = Arc<ApiState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WagerBody {
    /// Omitted → the sizer's suggestion for the current balance.
    #[serde(default)]
    pub stake: Option<Decimal>,
    pub direction: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResponse {
    pub forecast: Forecast,
    pub probability_low: f64,
    pub lean: Option<Direction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub balance: Option<Decimal>,
    pub guard: &'static str,
    pub settled: u64,
    pub won: u64,
    pub lost: u64,
    pub win_rate: f64,
    pub rejected_insufficient_funds: u64,
    pub rejected_preflight: u64,
    pub rejected_invalid: u64,
    pub errors: u64,
    pub net_pnl: Decimal,
    pub peak_balance: Option<Decimal>,
    pub drawdown: Decimal,
    pub drawdown_pct: Decimal,
    pub uptime_secs: i64,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn storage_error(e: WagerError) -> ApiError {
    warn!(error = %e, "Ledger read failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// GET /api/balance
pub async fn get_balance(State(state): State<AppState>) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.executor.read_balance().await.map_err(storage_error)?;
    Ok(Json(BalanceResponse { balance }))
}

/// GET /api/history?limit=N
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<OutcomeRecord>>, ApiError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);
    let history = state
        .executor
        .read_recent_history(limit)
        .await
        .map_err(storage_error)?;
    Ok(Json(history))
}

/// GET /api/forecast
pub async fn get_forecast(State(state): State<AppState>) -> Result<Json<ForecastResponse>, ApiError> {
    let forecast = state.executor.preview().await.ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "history unavailable" })),
        )
    })?;
    Ok(Json(ForecastResponse {
        probability_low: forecast.probability_low(),
        lean: forecast.lean(state.lean_threshold),
        forecast,
    }))
}

/// POST /api/wager
///
/// Invalid input answers 422 with a `REJECTED_INVALID` result; every other
/// outcome answers 200 with the result as-is.
pub async fn post_wager(
    State(state): State<AppState>,
    Json(body): Json<WagerBody>,
) -> (StatusCode, Json<WagerResult>) {
    let (stake, result) = match body.direction.parse::<Direction>() {
        Ok(direction) => {
            let stake = match body.stake {
                Some(stake) => stake,
                None => match state.executor.read_balance().await {
                    Ok(balance) => state.sizer.suggest(balance),
                    Err(e) => {
                        let result = WagerResult::failed(&e, None);
                        state.tally.write().await.record(Decimal::ZERO, &result);
                        return (StatusCode::OK, Json(result));
                    }
                },
            };
            (stake, state.executor.execute(stake, direction).await)
        }
        Err(e) => {
            let balance = state.executor.read_balance().await.ok();
            (Decimal::ZERO, WagerResult::failed(&e, balance))
        }
    };

    state.tally.write().await.record(stake, &result);

    let code = if result.status == WagerStatus::RejectedInvalid {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    (code, Json(result))
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let balance = state.executor.read_balance().await.ok();
    let tally = state.tally.read().await;
    let uptime = (Utc::now() - state.started_at).num_seconds();

    Json(StatusResponse {
        balance,
        guard: state.executor.guard_name(),
        settled: tally.settled,
        won: tally.won,
        lost: tally.lost,
        win_rate: tally.win_rate(),
        rejected_insufficient_funds: tally.rejected.insufficient_funds,
        rejected_preflight: tally.rejected.preflight,
        rejected_invalid: tally.rejected.invalid,
        errors: tally.errors,
        net_pnl: tally.net_pnl,
        peak_balance: tally.peak_balance,
        drawdown: tally.drawdown(),
        drawdown_pct: tally.drawdown_pct(),
        uptime_secs: uptime,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
