//! Strategy — advisory forecasting and stake sizing.
//!
//! Nothing in here mutates the ledger. The forecast is display metadata and
//! the sizer only proposes a stake.

pub mod forecast;
pub mod sizing;

pub use forecast::ForecastEngine;
pub use sizing::{SizingConfig, StakeSizer};
