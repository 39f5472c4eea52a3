//! End-to-end wager tests against a real on-disk ledger.

mod mock_guard;
mod scenarios;
mod concurrency;
mod atomicity;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use wager_engine::engine::WagerExecutor;
use wager_engine::guard::PreflightGuard;
use wager_engine::storage::draw::{DrawSource, FixedDraws};
use wager_engine::storage::Ledger;
use wager_engine::strategy::ForecastEngine;
use wager_engine::types::ValueRange;

pub const GUARD_TIMEOUT: Duration = Duration::from_millis(300);

pub fn temp_db() -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("wager_it_{}.db", uuid::Uuid::new_v4()));
    p
}

pub async fn open_ledger(path: &Path, balance: Decimal, draws: Box<dyn DrawSource>) -> Arc<Ledger> {
    Arc::new(
        Ledger::open(path, balance, ValueRange::default(), draws)
            .await
            .unwrap(),
    )
}

pub async fn fixed_ledger(balance: Decimal, draws: Vec<i64>) -> Arc<Ledger> {
    open_ledger(&temp_db(), balance, Box::new(FixedDraws::new(draws))).await
}

pub fn executor(ledger: Arc<Ledger>, guard: Arc<dyn PreflightGuard>) -> WagerExecutor {
    WagerExecutor::new(
        ledger,
        ForecastEngine::new(2_000, ValueRange::default(), Some(17)),
        guard,
        GUARD_TIMEOUT,
        20,
    )
}
