//! Single-caller wager scenarios through the full executor.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use wager_engine::storage::draw::{FixedDraws, UniformDraw};
use wager_engine::types::{Direction, WagerStatus};

use crate::mock_guard::MockGuard;
use crate::{executor, fixed_ledger, open_ledger, temp_db};

#[tokio::test]
async fn test_high_wager_on_73_wins() {
    let ledger = fixed_ledger(dec!(1000.00), vec![73]).await;
    let exec = executor(ledger.clone(), Arc::new(MockGuard::approving()));

    let result = exec.execute(dec!(10), Direction::High).await;

    assert_eq!(result.status, WagerStatus::Settled);
    assert_eq!(result.drawn_value, Some(73));
    assert!(result.won);
    assert_eq!(result.resulting_balance, Some(dec!(1010.00)));
    assert_eq!(exec.read_balance().await.unwrap(), dec!(1010.00));

    let history = exec.read_recent_history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].value, 73);
    assert_eq!(Some(history[0].sequence_id), result.sequence_id);
}

#[tokio::test]
async fn test_over_stake_rejected_without_trace() {
    let ledger = fixed_ledger(dec!(5.00), vec![10]).await;
    let exec = executor(ledger.clone(), Arc::new(MockGuard::approving()));

    let result = exec.execute(dec!(10), Direction::Low).await;

    assert_eq!(result.status, WagerStatus::RejectedInsufficientFunds);
    assert_eq!(result.resulting_balance, Some(dec!(5.00)));
    assert_eq!(exec.read_balance().await.unwrap(), dec!(5.00));
    assert_eq!(ledger.history_len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_repeated_rejection_is_idempotent() {
    let ledger = fixed_ledger(dec!(50), vec![99]).await;
    let exec = executor(ledger.clone(), Arc::new(MockGuard::approving()));

    for _ in 0..10 {
        let result = exec.execute(dec!(50.01), Direction::High).await;
        assert_eq!(result.status, WagerStatus::RejectedInsufficientFunds);
        assert_eq!(result.resulting_balance, Some(dec!(50)));
    }
    assert_eq!(ledger.read_balance().await.unwrap(), dec!(50));
    assert_eq!(ledger.history_len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_guard_veto_then_approve() {
    let guard = MockGuard::approving();
    guard.veto("vault below threshold");
    let ledger = fixed_ledger(dec!(100), vec![80]).await;
    let exec = executor(ledger.clone(), Arc::new(guard.clone()));

    let vetoed = exec.execute(dec!(10), Direction::High).await;
    assert_eq!(vetoed.status, WagerStatus::RejectedPreflight);
    assert_eq!(vetoed.reason.as_deref(), Some("Preflight rejected: vault below threshold"));
    assert_eq!(vetoed.resulting_balance, Some(dec!(100)));
    assert_eq!(ledger.history_len().await.unwrap(), 0);

    guard.approve();
    let settled = exec.execute(dec!(10), Direction::High).await;
    assert_eq!(settled.status, WagerStatus::Settled);
    assert_eq!(settled.resulting_balance, Some(dec!(110)));
    assert_eq!(guard.calls(), 2);
}

#[tokio::test]
async fn test_guard_error_fails_closed() {
    let guard = MockGuard::approving();
    guard.fail("rpc node unreachable");
    let ledger = fixed_ledger(dec!(100), vec![80]).await;
    let exec = executor(ledger.clone(), Arc::new(guard));

    let result = exec.execute(dec!(10), Direction::High).await;

    assert_eq!(result.status, WagerStatus::RejectedPreflight);
    assert!(result.reason.unwrap().contains("rpc node unreachable"));
    assert_eq!(ledger.read_balance().await.unwrap(), dec!(100));
}

#[tokio::test]
async fn test_guard_timeout_never_settles() {
    let guard = MockGuard::approving();
    guard.set_delay(Duration::from_secs(5));
    let ledger = fixed_ledger(dec!(100), vec![80]).await;
    let exec = executor(ledger.clone(), Arc::new(guard));

    let result = exec.execute(dec!(10), Direction::High).await;

    assert_eq!(result.status, WagerStatus::RejectedPreflight);
    assert!(result.reason.unwrap().contains("no answer within"));
    assert_eq!(ledger.history_len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_conservation_with_uniform_draws() {
    let ledger = open_ledger(&temp_db(), dec!(1000.00), Box::new(UniformDraw::seeded(2024))).await;
    let exec = executor(ledger.clone(), Arc::new(MockGuard::approving()));

    let mut expected = dec!(1000.00);
    for i in 0..60i64 {
        let stake = Decimal::new(100 + (i * 37) % 900, 2);
        let direction = if i % 2 == 0 { Direction::High } else { Direction::Low };
        let result = exec.execute(stake, direction).await;
        match result.status {
            WagerStatus::Settled => expected += if result.won { stake } else { -stake },
            WagerStatus::RejectedInsufficientFunds => {}
            other => panic!("unexpected status {other}"),
        }
        assert_eq!(result.resulting_balance, Some(expected));
    }

    assert_eq!(ledger.read_balance().await.unwrap(), expected);
    let history = ledger.read_recent_history(100).await.unwrap();
    let sum: Decimal = history.iter().map(|r| r.delta()).sum();
    assert_eq!(dec!(1000.00) + sum, expected);
}

#[tokio::test]
async fn test_restart_resumes_balance_and_history() {
    let path = temp_db();
    {
        let ledger = open_ledger(&path, dec!(300), Box::new(FixedDraws::new(vec![10, 90]))).await;
        let exec = executor(ledger.clone(), Arc::new(MockGuard::approving()));
        exec.execute(dec!(20), Direction::Low).await; // win → 320
        exec.execute(dec!(20), Direction::Low).await; // loss → 300
        ledger.close().await;
    }

    let ledger = open_ledger(&path, dec!(999), Box::new(FixedDraws::new(vec![]))).await;
    assert_eq!(ledger.read_balance().await.unwrap(), dec!(300));
    assert_eq!(ledger.recent_values(10).await.unwrap(), vec![90, 10]);
}

#[tokio::test]
async fn test_daily_loss_limit_stops_wagering() {
    let ledger = fixed_ledger(dec!(100), vec![10]).await;
    let guard = MockGuard::approving();
    let exec = executor(ledger.clone(), Arc::new(guard.clone()))
        .with_daily_loss_limit(Some(dec!(15)));

    assert!(exec.execute(dec!(10), Direction::High).await.is_settled());
    assert!(exec.execute(dec!(10), Direction::High).await.is_settled());

    let stopped = exec.execute(dec!(1), Direction::High).await;
    assert_eq!(stopped.status, WagerStatus::RejectedPreflight);
    assert_eq!(stopped.resulting_balance, Some(dec!(80)));
    assert_eq!(guard.calls(), 2);
    assert_eq!(ledger.history_len().await.unwrap(), 2);
}
