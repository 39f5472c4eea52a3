//! Crash-consistency: a write phase interrupted at any point leaves either
//! both effects or neither after a restart.

use rust_decimal_macros::dec;
use std::sync::Arc;

use wager_engine::storage::draw::FixedDraws;
use wager_engine::storage::FaultPoint;
use wager_engine::types::{Direction, WagerStatus};

use crate::mock_guard::MockGuard;
use crate::{executor, open_ledger, temp_db};

async fn interrupted_then_restarted(point: FaultPoint) {
    let path = temp_db();
    let ledger = open_ledger(&path, dec!(500), Box::new(FixedDraws::new(vec![90]))).await;
    let exec = executor(ledger.clone(), Arc::new(MockGuard::approving()));
    ledger.arm_fault(point).await;

    let result = exec.execute(dec!(50), Direction::High).await;

    assert_eq!(result.status, WagerStatus::Error, "fault {point}");
    assert_eq!(result.resulting_balance, Some(dec!(500)));
    assert!(result.drawn_value.is_none());
    drop(exec);
    ledger.close().await;

    let reopened = open_ledger(&path, dec!(0), Box::new(FixedDraws::new(vec![]))).await;
    assert_eq!(reopened.read_balance().await.unwrap(), dec!(500));
    assert_eq!(reopened.history_len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_interrupt_after_balance_update() {
    interrupted_then_restarted(FaultPoint::AfterBalanceUpdate).await;
}

#[tokio::test]
async fn test_interrupt_after_history_append() {
    interrupted_then_restarted(FaultPoint::AfterHistoryAppend).await;
}

#[tokio::test]
async fn test_error_is_not_retried() {
    let ledger = open_ledger(&temp_db(), dec!(500), Box::new(FixedDraws::new(vec![90, 10]))).await;
    let exec = executor(ledger.clone(), Arc::new(MockGuard::approving()));
    ledger.arm_fault(FaultPoint::AfterHistoryAppend).await;

    let failed = exec.execute(dec!(50), Direction::High).await;
    assert_eq!(failed.status, WagerStatus::Error);

    // The next wager consumes the next draw: the failed one was not replayed.
    let next = exec.execute(dec!(50), Direction::High).await;
    assert_eq!(next.drawn_value, Some(10));
    assert!(!next.won);
    assert_eq!(ledger.read_balance().await.unwrap(), dec!(450));
    assert_eq!(ledger.history_len().await.unwrap(), 1);
}
