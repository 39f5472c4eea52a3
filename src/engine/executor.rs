//! Wager executor.
//!
//! Orchestrates one wager: reads recent outcomes, computes the advisory
//! forecast, consults the preflight guard, and hands the request to the
//! ledger's atomic commit. Forecasting and guard checks run outside the
//! ledger's commit lock.
//!
//! An optional daily loss limit vetoes wagers once the loss realised since
//! UTC midnight reaches it. The limit is checked before the external guard
//! and, like it, outside the commit lock, so concurrent wagers already past
//! the check may overshoot it by their stakes.

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::guard::{check_with_timeout, GuardVerdict, PreflightGuard};
use crate::storage::Ledger;
use crate::strategy::ForecastEngine;
use crate::types::{
    Direction, Forecast, OutcomeRecord, WagerError, WagerRequest, WagerResult,
};

// ---------------------------------------------------------------------------
// Request lifecycle
// ---------------------------------------------------------------------------

/// Per-request lifecycle. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Forecasting,
    GuardCheck,
    Rejected,
    Committing,
    Settled,
    Error,
}

impl Stage {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(&self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Received, Forecasting)
                | (Received, Rejected)
                | (Forecasting, GuardCheck)
                | (GuardCheck, Rejected)
                | (GuardCheck, Committing)
                | (Committing, Settled)
                | (Committing, Rejected)
                | (Committing, Error)
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "RECEIVED",
            Stage::Forecasting => "FORECASTING",
            Stage::GuardCheck => "GUARD_CHECK",
            Stage::Rejected => "REJECTED",
            Stage::Committing => "COMMITTING",
            Stage::Settled => "SETTLED",
            Stage::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Tracks one request through its stages.
struct Lifecycle {
    stage: Stage,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            stage: Stage::Received,
        }
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal transition {} -> {next}",
            self.stage
        );
        debug!(from = %self.stage, to = %next, "Stage");
        self.stage = next;
    }

    /// Terminal stage matching a ledger result.
    fn finish(&mut self, result: &WagerResult) {
        let next = if result.is_settled() {
            Stage::Settled
        } else if result.status.is_rejection() {
            Stage::Rejected
        } else {
            Stage::Error
        };
        self.advance(next);
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct WagerExecutor {
    ledger: Arc<Ledger>,
    forecaster: ForecastEngine,
    guard: Arc<dyn PreflightGuard>,
    guard_timeout: Duration,
    history_window: u32,
    daily_loss_limit: Option<Decimal>,
}

impl WagerExecutor {
    pub fn new(
        ledger: Arc<Ledger>,
        forecaster: ForecastEngine,
        guard: Arc<dyn PreflightGuard>,
        guard_timeout: Duration,
        history_window: u32,
    ) -> Self {
        Self {
            ledger,
            forecaster,
            guard,
            guard_timeout,
            history_window,
            daily_loss_limit: None,
        }
    }

    /// Veto wagers once the day's realised loss reaches `limit`.
    pub fn with_daily_loss_limit(mut self, limit: Option<Decimal>) -> Self {
        self.daily_loss_limit = limit;
        self
    }

    pub fn guard_name(&self) -> &'static str {
        self.guard.name()
    }

    /// Execute one wager from raw parts.
    pub async fn execute(&self, stake: Decimal, direction: Direction) -> WagerResult {
        self.execute_request(WagerRequest { stake, direction }).await
    }

    /// Execute one wager end to end. Processed exactly once; never retried.
    pub async fn execute_request(&self, request: WagerRequest) -> WagerResult {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "wager",
            request_id = %request_id,
            stake = %request.stake,
            direction = %request.direction
        );
        self.run(request, request_id).instrument(span).await
    }

    async fn run(&self, request: WagerRequest, request_id: Uuid) -> WagerResult {
        let mut lifecycle = Lifecycle::new();
        // Reported by every rejection decided here.
        let received_balance = self.ledger.read_balance().await.ok();

        if let Err(e) = request.validate() {
            lifecycle.advance(Stage::Rejected);
            info!(reason = %e, "Wager rejected as invalid");
            return WagerResult::failed(&e, received_balance).with_request_id(request_id);
        }

        lifecycle.advance(Stage::Forecasting);
        let forecast = self.forecast().await;

        lifecycle.advance(Stage::GuardCheck);
        let verdict = match self.loss_limit_veto().await {
            Some(veto) => veto,
            None => check_with_timeout(self.guard.as_ref(), self.guard_timeout).await,
        };
        if !verdict.approved {
            lifecycle.advance(Stage::Rejected);
            info!(reason = %verdict.reason, "Wager vetoed");
            let error = WagerError::GuardRejected(verdict.reason);
            return WagerResult::failed(&error, received_balance)
                .with_request_id(request_id)
                .with_forecast(forecast);
        }

        lifecycle.advance(Stage::Committing);
        let result = self
            .ledger
            .commit_wager(request.stake, request.direction)
            .await
            .with_request_id(request_id)
            .with_forecast(forecast);
        lifecycle.finish(&result);

        info!(status = %result.status, stage = %lifecycle.stage, "Wager finished");
        result
    }

    /// A veto once today's realised loss has reached the limit. Fails closed
    /// when the history cannot be read.
    async fn loss_limit_veto(&self) -> Option<GuardVerdict> {
        let limit = self.daily_loss_limit?;
        match self.ledger.realised_pnl_since(start_of_day(Utc::now())).await {
            Ok(pnl) => {
                let loss = -pnl;
                if loss < limit {
                    return None;
                }
                warn!(loss = %loss, limit = %limit, "Daily loss limit reached");
                Some(GuardVerdict::veto(format!(
                    "daily loss limit reached: lost {loss:.2} of {limit:.2}"
                )))
            }
            Err(e) => {
                warn!(error = %e, "Daily loss unavailable; failing closed");
                Some(GuardVerdict::veto(format!("daily loss unavailable: {e}")))
            }
        }
    }

    /// Advisory forecast, or `None` if history could not be read.
    async fn forecast(&self) -> Option<Forecast> {
        match self.ledger.recent_values(self.history_window).await {
            Ok(values) => Some(self.forecaster.forecast(&values)),
            Err(e) => {
                warn!(error = %e, "History unavailable; continuing without forecast");
                None
            }
        }
    }

    /// Forecast for the next draw without placing a wager.
    pub async fn preview(&self) -> Option<Forecast> {
        self.forecast().await
    }

    pub async fn read_balance(&self) -> Result<Decimal, WagerError> {
        self.ledger.read_balance().await
    }

    pub async fn read_recent_history(&self, limit: u32) -> Result<Vec<OutcomeRecord>, WagerError> {
        self.ledger.read_recent_history(limit).await
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
