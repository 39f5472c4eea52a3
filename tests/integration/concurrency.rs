//! Concurrent callers sharing one ledger.

use futures::future::join_all;
use rust_decimal_macros::dec;
use std::sync::Arc;

use wager_engine::types::{Direction, WagerStatus};

use crate::executor;
use crate::fixed_ledger;
use crate::mock_guard::MockGuard;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_double_spend() {
    // Every draw loses for HIGH; 100 affords exactly 4 stakes of 25.
    let ledger = fixed_ledger(dec!(100), vec![1]).await;
    let exec = Arc::new(executor(ledger.clone(), Arc::new(MockGuard::approving())));

    let tasks = (0..12).map(|_| {
        let exec = exec.clone();
        tokio::spawn(async move { exec.execute(dec!(25), Direction::High).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let settled = results.iter().filter(|r| r.status == WagerStatus::Settled).count();
    let rejected = results
        .iter()
        .filter(|r| r.status == WagerStatus::RejectedInsufficientFunds)
        .count();

    assert_eq!(settled, 4);
    assert_eq!(rejected, 8);
    assert_eq!(ledger.read_balance().await.unwrap(), dec!(0));
    assert_eq!(ledger.history_len().await.unwrap(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sequence_ids_unique_and_balances_chain() {
    let ledger = fixed_ledger(dec!(1000), vec![20, 80, 35, 66, 50, 51]).await;
    let exec = Arc::new(executor(ledger.clone(), Arc::new(MockGuard::approving())));

    let tasks = (0..30).map(|i| {
        let exec = exec.clone();
        let direction = if i % 2 == 0 { Direction::High } else { Direction::Low };
        tokio::spawn(async move { exec.execute(dec!(5), direction).await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert!(results.iter().all(|r| r.is_settled()));

    // Replaying the history oldest-first reproduces every recorded balance.
    let mut history = ledger.read_recent_history(100).await.unwrap();
    history.reverse();
    let mut balance = dec!(1000);
    for record in &history {
        balance += record.delta();
        assert_eq!(record.balance_after, balance);
    }
    assert_eq!(ledger.read_balance().await.unwrap(), balance);

    let mut ids: Vec<i64> = results.iter().filter_map(|r| r.sequence_id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 30);
}
