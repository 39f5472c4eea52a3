//! Core engine — forecast → guard → commit for each wager, plus the
//! session tally.

pub mod accountant;
pub mod executor;

pub use accountant::Tally;
pub use executor::{Stage, WagerExecutor};
