//! Preflight guards.
//!
//! Defines the `PreflightGuard` trait and provides implementations for:
//! - `AlwaysApprove` — permissive default
//! - `DenyAll` — fixed veto (maintenance)
//! - `SimulatedDryRun` — latency-bound simulated bundle check
//! - `RpcBalanceGuard` — external vault balance via JSON-RPC
//!
//! Guards never see the ledger. They are always consulted through
//! [`check_with_timeout`], which fails closed.

pub mod rpc;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{AppConfig, GuardConfig, GuardKind};
pub use rpc::RpcBalanceGuard;

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Outcome of one guard consultation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardVerdict {
    pub approved: bool,
    pub reason: String,
}

impl GuardVerdict {
    pub fn approve(reason: impl Into<String>) -> Self {
        Self {
            approved: true,
            reason: reason.into(),
        }
    }

    pub fn veto(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// An independent veto gate evaluated before a wager commits.
///
/// Implementors must be side-effect-free with respect to the ledger. An
/// `Err` is treated exactly like a veto.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreflightGuard: Send + Sync {
    async fn check(&self) -> Result<GuardVerdict>;

    /// Guard name for logging.
    fn name(&self) -> &'static str;
}

/// Consult `guard`, treating errors and timeouts as a veto.
pub async fn check_with_timeout(guard: &dyn PreflightGuard, timeout: Duration) -> GuardVerdict {
    let verdict = match tokio::time::timeout(timeout, guard.check()).await {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => {
            warn!(guard = guard.name(), error = %e, "Guard check failed; failing closed");
            GuardVerdict::veto(format!("{} check failed: {e:#}", guard.name()))
        }
        Err(_) => {
            warn!(
                guard = guard.name(),
                timeout_ms = timeout.as_millis() as u64,
                "Guard timed out; failing closed"
            );
            GuardVerdict::veto(format!(
                "{} gave no answer within {}ms",
                guard.name(),
                timeout.as_millis()
            ))
        }
    };
    debug!(guard = guard.name(), approved = verdict.approved, reason = %verdict.reason, "Guard verdict");
    verdict
}

// ---------------------------------------------------------------------------
// Simple guards
// ---------------------------------------------------------------------------

/// Approves every wager.
pub struct AlwaysApprove;

#[async_trait]
impl PreflightGuard for AlwaysApprove {
    async fn check(&self) -> Result<GuardVerdict> {
        Ok(GuardVerdict::approve("no preflight restrictions"))
    }

    fn name(&self) -> &'static str {
        "always-approve"
    }
}

/// Vetoes every wager with a fixed reason.
pub struct DenyAll {
    reason: String,
}

impl DenyAll {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PreflightGuard for DenyAll {
    async fn check(&self) -> Result<GuardVerdict> {
        Ok(GuardVerdict::veto(self.reason.clone()))
    }

    fn name(&self) -> &'static str {
        "deny-all"
    }
}

/// Simulates a bundle dry-run: waits `delay`, then passes or reports slip.
pub struct SimulatedDryRun {
    delay: Duration,
    passes: bool,
}

impl SimulatedDryRun {
    pub fn new(delay: Duration, passes: bool) -> Self {
        Self { delay, passes }
    }
}

#[async_trait]
impl PreflightGuard for SimulatedDryRun {
    async fn check(&self) -> Result<GuardVerdict> {
        tokio::time::sleep(self.delay).await;
        if self.passes {
            Ok(GuardVerdict::approve("dry-run simulated cleanly"))
        } else {
            Ok(GuardVerdict::veto("dry-run detected price slip; bundle dropped"))
        }
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

// ---------------------------------------------------------------------------
// Construction from config
// ---------------------------------------------------------------------------

/// Build the guard selected in configuration. Secrets are resolved from the
/// environment variables the config names.
pub fn from_config(cfg: &GuardConfig) -> Result<Arc<dyn PreflightGuard>> {
    let guard: Arc<dyn PreflightGuard> = match cfg.kind {
        GuardKind::Permissive => Arc::new(AlwaysApprove),
        GuardKind::DenyAll => Arc::new(DenyAll::new(
            cfg.deny_reason
                .clone()
                .unwrap_or_else(|| "wagering is paused".to_string()),
        )),
        GuardKind::DryRun => Arc::new(SimulatedDryRun::new(
            Duration::from_millis(cfg.dry_run_delay_ms),
            true,
        )),
        GuardKind::RpcBalance => {
            let url = AppConfig::resolve_env(&cfg.rpc_url_env)?;
            let address = AppConfig::resolve_env(&cfg.vault_address_env)?;
            Arc::new(RpcBalanceGuard::new(SecretString::new(url), address)?)
        }
    };
    Ok(guard)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
