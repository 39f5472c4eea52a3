//! Shared types for the wager engine.
//!
//! These types form the data model used across all modules. They are kept
//! free of engine logic so that storage, strategy, guard and engine modules
//! can depend on them without circular references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Direction & value range
// ---------------------------------------------------------------------------

/// Predicted direction of the next drawn value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    High,
    Low,
}

impl Direction {
    /// Whether `value` settles as a win for this direction.
    ///
    /// HIGH wins strictly above the midpoint, LOW wins at or below it.
    pub fn wins(&self, value: i64, range: ValueRange) -> bool {
        match self {
            Direction::High => value > range.midpoint(),
            Direction::Low => value <= range.midpoint(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::High => "HIGH",
            Direction::Low => "LOW",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a direction (case-insensitive). Accepts the CALL/PUT and
/// HIGHER/LOWER spellings chat front-ends send.
impl std::str::FromStr for Direction {
    type Err = WagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" | "higher" | "h" | "call" | "up" => Ok(Direction::High),
            "low" | "lower" | "l" | "put" | "down" => Ok(Direction::Low),
            _ => Err(WagerError::InvalidRequest(format!("unknown direction: {s:?}"))),
        }
    }
}

/// Inclusive range outcome values are drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: i64,
    pub max: i64,
}

impl Default for ValueRange {
    fn default() -> Self {
        Self { min: 1, max: 100 }
    }
}

impl ValueRange {
    pub fn new(min: i64, max: i64) -> anyhow::Result<Self> {
        if min >= max {
            anyhow::bail!("value range must satisfy min < max (got {min}..={max})");
        }
        Ok(Self { min, max })
    }

    /// Split point between LOW and HIGH (50 for 1–100).
    pub fn midpoint(&self) -> i64 {
        (self.min + self.max).div_euclid(2)
    }

    pub fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

// ---------------------------------------------------------------------------
// Ledger records
// ---------------------------------------------------------------------------

/// One settled wager as persisted in the append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Monotonic id assigned at insert.
    pub sequence_id: i64,
    pub value: i64,
    pub direction: Direction,
    pub stake: Decimal,
    pub won: bool,
    pub balance_after: Decimal,
    pub settled_at: DateTime<Utc>,
}

impl OutcomeRecord {
    /// Signed balance change produced by this settlement.
    pub fn delta(&self) -> Decimal {
        if self.won {
            self.stake
        } else {
            -self.stake
        }
    }
}

// ---------------------------------------------------------------------------
// Forecast
// ---------------------------------------------------------------------------

/// Advisory output of the random-walk forecast. Display only; never an
/// input to the ledger draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// Fraction of simulated draws above the range midpoint.
    pub probability_high: f64,
    /// Mean of first differences.
    pub drift: f64,
    /// Population standard deviation of first differences.
    pub volatility: f64,
    /// History points the estimate was calibrated on.
    pub samples: usize,
    pub iterations: u32,
}

impl Forecast {
    /// The no-information estimate.
    pub fn neutral(samples: usize, iterations: u32) -> Self {
        Self {
            probability_high: 0.5,
            drift: 0.0,
            volatility: 0.0,
            samples,
            iterations,
        }
    }

    pub fn probability_low(&self) -> f64 {
        1.0 - self.probability_high
    }

    /// Direction the model leans towards, if the estimate departs from
    /// 0.5 by more than `threshold`.
    pub fn lean(&self, threshold: f64) -> Option<Direction> {
        let skew = self.probability_high - 0.5;
        if skew > threshold {
            Some(Direction::High)
        } else if -skew > threshold {
            Some(Direction::Low)
        } else {
            None
        }
    }
}

impl fmt::Display for Forecast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "P(HIGH)={:.1}% drift={:+.2} vol={:.2} (n={}, iters={})",
            self.probability_high * 100.0,
            self.drift,
            self.volatility,
            self.samples,
            self.iterations,
        )
    }
}

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

/// A single stake-and-predict request. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WagerRequest {
    pub stake: Decimal,
    pub direction: Direction,
}

impl WagerRequest {
    pub fn validate(&self) -> Result<(), WagerError> {
        if self.stake <= Decimal::ZERO {
            return Err(WagerError::InvalidRequest(format!(
                "stake must be positive (got {})",
                self.stake
            )));
        }
        Ok(())
    }
}

/// Terminal status of a wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WagerStatus {
    Settled,
    RejectedInsufficientFunds,
    RejectedPreflight,
    RejectedInvalid,
    Error,
}

impl WagerStatus {
    /// Whether the ledger was left untouched by design (not by failure).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            WagerStatus::RejectedInsufficientFunds
                | WagerStatus::RejectedPreflight
                | WagerStatus::RejectedInvalid
        )
    }
}

impl fmt::Display for WagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WagerStatus::Settled => "SETTLED",
            WagerStatus::RejectedInsufficientFunds => "REJECTED_INSUFFICIENT_FUNDS",
            WagerStatus::RejectedPreflight => "REJECTED_PREFLIGHT",
            WagerStatus::RejectedInvalid => "REJECTED_INVALID",
            WagerStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Caller-facing outcome of one wager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WagerResult {
    pub request_id: Uuid,
    pub status: WagerStatus,
    pub drawn_value: Option<i64>,
    pub won: bool,
    /// Balance after the call. For every non-settled status this equals the
    /// balance before the call; `None` only if it could not be read.
    pub resulting_balance: Option<Decimal>,
    pub sequence_id: Option<i64>,
    pub reason: Option<String>,
    pub forecast: Option<Forecast>,
}

impl WagerResult {
    pub fn settled(record: &OutcomeRecord) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            status: WagerStatus::Settled,
            drawn_value: Some(record.value),
            won: record.won,
            resulting_balance: Some(record.balance_after),
            sequence_id: Some(record.sequence_id),
            reason: None,
            forecast: None,
        }
    }

    /// A result for a wager that left the ledger unchanged.
    pub fn failed(error: &WagerError, balance: Option<Decimal>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            status: error.status(),
            drawn_value: None,
            won: false,
            resulting_balance: balance,
            sequence_id: None,
            reason: Some(error.to_string()),
            forecast: None,
        }
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_forecast(mut self, forecast: Option<Forecast>) -> Self {
        self.forecast = forecast;
        self
    }

    pub fn is_settled(&self) -> bool {
        self.status == WagerStatus::Settled
    }
}

impl fmt::Display for WagerResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        if let Some(value) = self.drawn_value {
            write!(f, " drew {value} {}", if self.won { "WIN" } else { "LOSS" })?;
        }
        if let Some(balance) = self.resulting_balance {
            write!(f, " balance={balance:.2}")?;
        }
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain error taxonomy. Every variant is surfaced to callers as a typed
/// [`WagerResult`], never as a panic.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WagerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Insufficient funds: need {needed:.2}, have {available:.2}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Preflight rejected: {0}")]
    GuardRejected(String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Drawn value {value} outside range {range}")]
    InvalidDraw { value: i64, range: ValueRange },
}

impl WagerError {
    pub fn status(&self) -> WagerStatus {
        match self {
            WagerError::InvalidRequest(_) => WagerStatus::RejectedInvalid,
            WagerError::InsufficientFunds { .. } => WagerStatus::RejectedInsufficientFunds,
            WagerError::GuardRejected(_) => WagerStatus::RejectedPreflight,
            WagerError::Storage(_) | WagerError::InvalidDraw { .. } => WagerStatus::Error,
        }
    }
}

impl From<sqlx::Error> for WagerError {
    fn from(e: sqlx::Error) -> Self {
        WagerError::Storage(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
