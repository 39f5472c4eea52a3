//! Fixed-fractional stake sizing.
//!
//! Suggests a stake as a fixed fraction of the current balance with a floor,
//! rounded to cents. Used when a caller asks to wager without naming a stake.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SizingConfig {
    /// Fraction of balance risked per wager (0.02 = 2%).
    pub fraction: Decimal,
    /// Smallest stake ever suggested.
    pub minimum: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            fraction: dec!(0.02),
            minimum: dec!(1.00),
        }
    }
}

pub struct StakeSizer {
    config: SizingConfig,
}

impl StakeSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// Suggested stake for `balance`. May exceed a balance below the
    /// minimum; the ledger rejects such a wager as insufficient funds.
    pub fn suggest(&self, balance: Decimal) -> Decimal {
        let raw = (balance.max(Decimal::ZERO) * self.config.fraction).round_dp(2);
        let stake = raw.max(self.config.minimum);
        debug!(balance = %balance, stake = %stake, "Stake suggested");
        stake
    }
}
