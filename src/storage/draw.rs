//! Outcome draw sources.
//!
//! The ledger samples each settlement value through a `DrawSource` so that
//! production uses a uniform RNG while tests can script exact values.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::types::ValueRange;

/// Produces the value a wager settles against.
pub trait DrawSource: Send {
    fn draw(&mut self, range: ValueRange) -> i64;
}

/// Uniform draw over the inclusive range.
pub struct UniformDraw {
    rng: ChaCha8Rng,
}

impl UniformDraw {
    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Reproducible sequence for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl DrawSource for UniformDraw {
    fn draw(&mut self, range: ValueRange) -> i64 {
        self.rng.gen_range(range.min..=range.max)
    }
}

/// Scripted draws, cycling through the given values. An empty script
/// draws the range midpoint.
#[derive(Debug, Clone)]
pub struct FixedDraws {
    values: Vec<i64>,
    next: usize,
}

impl FixedDraws {
    pub fn new(values: impl Into<Vec<i64>>) -> Self {
        Self {
            values: values.into(),
            next: 0,
        }
    }
}

impl DrawSource for FixedDraws {
    fn draw(&mut self, range: ValueRange) -> i64 {
        if self.values.is_empty() {
            return range.midpoint();
        }
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value
    }
}
