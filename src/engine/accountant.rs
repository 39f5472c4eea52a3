//! Accountant — session tally of wager outcomes.
//!
//! Folds every `WagerResult` into running counts, net P&L and drawdown.
//! Balance figures come from the results themselves, so the tally never
//! queries the ledger.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::types::{WagerResult, WagerStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RejectionCounts {
    pub insufficient_funds: u64,
    pub preflight: u64,
    pub invalid: u64,
}

impl RejectionCounts {
    pub fn total(&self) -> u64 {
        self.insufficient_funds + self.preflight + self.invalid
    }
}

/// Running totals for one process lifetime.
///
/// Peak and drawdown follow the order results are recorded in, which under
/// concurrent callers may differ from settlement order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Tally {
    pub settled: u64,
    pub won: u64,
    pub lost: u64,
    pub rejected: RejectionCounts,
    pub errors: u64,
    /// Sum of signed deltas of settled wagers.
    pub net_pnl: Decimal,
    pub peak_balance: Option<Decimal>,
    pub last_balance: Option<Decimal>,
}

impl Tally {
    /// Start a tally from the balance at startup.
    pub fn new(opening_balance: Option<Decimal>) -> Self {
        Self {
            peak_balance: opening_balance,
            last_balance: opening_balance,
            ..Default::default()
        }
    }

    /// Fold in one result. `stake` is the amount the request wagered.
    pub fn record(&mut self, stake: Decimal, result: &WagerResult) {
        match result.status {
            WagerStatus::Settled => {
                self.settled += 1;
                if result.won {
                    self.won += 1;
                    self.net_pnl += stake;
                } else {
                    self.lost += 1;
                    self.net_pnl -= stake;
                }
            }
            WagerStatus::RejectedInsufficientFunds => self.rejected.insufficient_funds += 1,
            WagerStatus::RejectedPreflight => self.rejected.preflight += 1,
            WagerStatus::RejectedInvalid => self.rejected.invalid += 1,
            WagerStatus::Error => self.errors += 1,
        }

        if let Some(balance) = result.resulting_balance {
            self.last_balance = Some(balance);
            self.peak_balance = Some(self.peak_balance.map_or(balance, |p| p.max(balance)));
        }

        info!(
            status = %result.status,
            settled = self.settled,
            won = self.won,
            rejected = self.rejected.total(),
            net_pnl = %self.net_pnl,
            "Tally updated"
        );
    }

    /// Fraction of settled wagers won; 0 before any settle.
    pub fn win_rate(&self) -> f64 {
        if self.settled == 0 {
            0.0
        } else {
            self.won as f64 / self.settled as f64
        }
    }

    /// Distance of the latest balance below the peak.
    pub fn drawdown(&self) -> Decimal {
        match (self.peak_balance, self.last_balance) {
            (Some(peak), Some(last)) => (peak - last).max(Decimal::ZERO),
            _ => Decimal::ZERO,
        }
    }

    /// Drawdown as a fraction of the peak.
    pub fn drawdown_pct(&self) -> Decimal {
        match self.peak_balance {
            Some(peak) if peak > Decimal::ZERO => self.drawdown() / peak,
            _ => Decimal::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
