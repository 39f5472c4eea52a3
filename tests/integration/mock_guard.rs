//! Mock preflight guard for integration testing.
//!
//! Provides a deterministic `PreflightGuard` whose verdict, latency and
//! failure mode are controllable from test code while wagers are in flight.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wager_engine::guard::{GuardVerdict, PreflightGuard};

#[derive(Debug, Clone)]
enum Mode {
    Approve,
    Veto(String),
    Fail(String),
}

/// A mock guard. Clones share state, so a test can keep a handle and flip
/// the mode after handing the guard to an executor.
#[derive(Clone)]
pub struct MockGuard {
    mode: Arc<Mutex<Mode>>,
    delay: Arc<Mutex<Duration>>,
    calls: Arc<AtomicU64>,
}

impl MockGuard {
    pub fn approving() -> Self {
        Self {
            mode: Arc::new(Mutex::new(Mode::Approve)),
            delay: Arc::new(Mutex::new(Duration::ZERO)),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn approve(&self) {
        *self.mode.lock().unwrap() = Mode::Approve;
    }

    pub fn veto(&self, reason: &str) {
        *self.mode.lock().unwrap() = Mode::Veto(reason.to_string());
    }

    /// Make every check return an error.
    pub fn fail(&self, msg: &str) {
        *self.mode.lock().unwrap() = Mode::Fail(msg.to_string());
    }

    /// Delay every check before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PreflightGuard for MockGuard {
    async fn check(&self) -> Result<GuardVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mode = self.mode.lock().unwrap().clone();
        match mode {
            Mode::Approve => Ok(GuardVerdict::approve("mock approves")),
            Mode::Veto(reason) => Ok(GuardVerdict::veto(reason)),
            Mode::Fail(msg) => Err(anyhow!(msg)),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
