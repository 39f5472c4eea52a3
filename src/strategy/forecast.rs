//! Random-walk Monte Carlo forecast.
//!
//! Calibrates drift and volatility on the first differences of recent
//! outcomes, then simulates the next value `iterations` times and reports
//! the fraction landing above the range midpoint. The estimate is advisory:
//! the ledger's draw is uniform and independent of it.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use std::sync::Mutex;
use tracing::debug;

use crate::types::{Forecast, ValueRange};

/// Probability that the next value lands in the HIGH half.
///
/// `history` is chronological (oldest first). Fewer than two points, or zero
/// iterations, yields exactly 0.5.
pub fn estimate_probability<R: Rng + ?Sized>(
    history: &[i64],
    iterations: u32,
    range: ValueRange,
    rng: &mut R,
) -> f64 {
    simulate(history, iterations, range, rng).probability_high
}

/// Full forecast including the calibrated parameters.
pub fn simulate<R: Rng + ?Sized>(
    history: &[i64],
    iterations: u32,
    range: ValueRange,
    rng: &mut R,
) -> Forecast {
    let (drift, volatility) = match drift_and_volatility(history) {
        Some(params) => params,
        None => return Forecast::neutral(history.len(), iterations),
    };
    if iterations == 0 {
        return Forecast::neutral(history.len(), iterations);
    }

    // Non-empty: drift_and_volatility needs at least two points.
    let last = history[history.len() - 1] as f64;
    let midpoint = range.midpoint() as f64;

    let above = (0..iterations)
        .filter(|_| {
            let z: f64 = StandardNormal.sample(&mut *rng);
            last + drift + volatility * z > midpoint
        })
        .count();

    Forecast {
        probability_high: (above as f64 / f64::from(iterations)).clamp(0.0, 1.0),
        drift,
        volatility,
        samples: history.len(),
        iterations,
    }
}

/// Mean and population standard deviation of first differences, or `None`
/// with fewer than two points.
pub fn drift_and_volatility(history: &[i64]) -> Option<(f64, f64)> {
    if history.len() < 2 {
        return None;
    }
    let diffs: Vec<f64> = history.windows(2).map(|w| (w[1] - w[0]) as f64).collect();
    let n = diffs.len() as f64;
    let mean = diffs.iter().sum::<f64>() / n;
    let variance = diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns the simulation RNG and parameters. Safe to share across tasks; it
/// never touches the ledger.
pub struct ForecastEngine {
    iterations: u32,
    range: ValueRange,
    rng: Mutex<ChaCha8Rng>,
}

impl ForecastEngine {
    /// `seed = None` draws from entropy.
    pub fn new(iterations: u32, range: ValueRange, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            iterations,
            range,
            rng: Mutex::new(rng),
        }
    }

    /// Forecast from ledger-ordered history (newest first).
    pub fn forecast(&self, newest_first: &[i64]) -> Forecast {
        let chronological: Vec<i64> = newest_first.iter().rev().copied().collect();
        // Only the per-call seed is drawn under the lock.
        let mut rng = ChaCha8Rng::seed_from_u64(self.next_seed());
        let forecast = simulate(&chronological, self.iterations, self.range, &mut rng);
        debug!(%forecast, "Forecast computed");
        forecast
    }

    fn next_seed(&self) -> u64 {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
