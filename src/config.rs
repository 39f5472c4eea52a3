//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (RPC URLs) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::strategy::SizingConfig;
use crate::types::ValueRange;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub sizing: SizingSection,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    pub database_path: String,
    pub initial_balance: Decimal,
    #[serde(default = "default_value_min")]
    pub value_min: i64,
    #[serde(default = "default_value_max")]
    pub value_max: i64,
    /// Fixed seed for the settlement draw. Leave unset in production.
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ForecastConfig {
    pub iterations: u32,
    /// Settled outcomes the random walk is calibrated on.
    pub history_window: u32,
    /// Skew from 0.5 beyond which the forecast reports a lean.
    pub lean_threshold: f64,
    pub seed: Option<u64>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            iterations: 10_000,
            history_window: 20,
            lean_threshold: 0.05,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    Permissive,
    DenyAll,
    DryRun,
    RpcBalance,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GuardConfig {
    pub kind: GuardKind,
    pub timeout_ms: u64,
    pub dry_run_delay_ms: u64,
    pub deny_reason: Option<String>,
    pub rpc_url_env: String,
    pub vault_address_env: String,
    /// Realised loss since UTC midnight at which wagers are vetoed.
    pub max_daily_loss: Option<Decimal>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            kind: GuardKind::Permissive,
            timeout_ms: 3_000,
            dry_run_delay_ms: 1_500,
            deny_reason: None,
            rpc_url_env: "RPC_URL".to_string(),
            vault_address_env: "VAULT_ADDRESS".to_string(),
            max_daily_loss: None,
        }
    }
}

impl GuardConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SizingSection {
    pub fraction: Decimal,
    pub minimum: Decimal,
}

impl Default for SizingSection {
    fn default() -> Self {
        let d = SizingConfig::default();
        Self {
            fraction: d.fraction,
            minimum: d.minimum,
        }
    }
}

impl From<&SizingSection> for SizingConfig {
    fn from(s: &SizingSection) -> Self {
        SizingConfig {
            fraction: s.fraction,
            minimum: s.minimum,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

fn default_value_min() -> i64 {
    1
}

fn default_value_max() -> i64 {
    100
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Invalid TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.value_range()?;
        if self.ledger.initial_balance < Decimal::ZERO {
            anyhow::bail!("ledger.initial_balance must not be negative");
        }
        if self.forecast.iterations == 0 {
            anyhow::bail!("forecast.iterations must be positive");
        }
        if !(0.0..0.5).contains(&self.forecast.lean_threshold) {
            anyhow::bail!("forecast.lean_threshold must be in [0, 0.5)");
        }
        if self.guard.timeout_ms == 0 {
            anyhow::bail!("guard.timeout_ms must be positive");
        }
        if matches!(self.guard.max_daily_loss, Some(limit) if limit <= Decimal::ZERO) {
            anyhow::bail!("guard.max_daily_loss must be positive");
        }
        if self.sizing.fraction <= Decimal::ZERO || self.sizing.fraction > dec!(1) {
            anyhow::bail!("sizing.fraction must be in (0, 1]");
        }
        if self.sizing.minimum <= Decimal::ZERO {
            anyhow::bail!("sizing.minimum must be positive");
        }
        Ok(())
    }

    pub fn value_range(&self) -> Result<ValueRange> {
        ValueRange::new(self.ledger.value_min, self.ledger.value_max)
            .context("Invalid ledger value range")
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [ledger]
        database_path = "wager.db"
        initial_balance = 1000.0
    "#;

    #[test]
    fn test_minimal_config_defaults() {
        let cfg = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(cfg.ledger.initial_balance, dec!(1000));
        assert_eq!(cfg.value_range().unwrap(), ValueRange::default());
        assert_eq!(cfg.forecast.iterations, 10_000);
        assert_eq!(cfg.guard.kind, GuardKind::Permissive);
        assert_eq!(cfg.guard.timeout(), Duration::from_secs(3));
        assert_eq!(cfg.guard.max_daily_loss, None);
        assert_eq!(cfg.sizing.fraction, dec!(0.02));
        assert_eq!(cfg.api.port, 8080);
    }

    #[test]
    fn test_full_config() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [ledger]
            database_path = "/data/betting.db"
            initial_balance = 250.5
            value_min = 0
            value_max = 36
            seed = 7

            [forecast]
            iterations = 500
            history_window = 5
            lean_threshold = 0.1

            [guard]
            kind = "rpc_balance"
            timeout_ms = 800
            rpc_url_env = "POLYGON_RPC"
            max_daily_loss = 100.0

            [sizing]
            fraction = 0.05
            minimum = 2.0

            [api]
            bind = "0.0.0.0"
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(cfg.ledger.initial_balance, dec!(250.5));
        assert_eq!(cfg.value_range().unwrap().midpoint(), 18);
        assert_eq!(cfg.ledger.seed, Some(7));
        assert_eq!(cfg.forecast.history_window, 5);
        assert_eq!(cfg.guard.kind, GuardKind::RpcBalance);
        assert_eq!(cfg.guard.rpc_url_env, "POLYGON_RPC");
        assert_eq!(cfg.guard.vault_address_env, "VAULT_ADDRESS");
        assert_eq!(cfg.guard.max_daily_loss, Some(dec!(100)));
        assert_eq!(SizingConfig::from(&cfg.sizing).minimum, dec!(2));
        assert_eq!(cfg.api.bind, "0.0.0.0");
    }

    #[test]
    fn test_rejects_inverted_range() {
        let text = format!("{MINIMAL}\nvalue_min = 100\nvalue_max = 1\n");
        assert!(AppConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_rejects_zero_iterations() {
        let text = format!(
            "{MINIMAL}\n[forecast]\niterations = 0\nhistory_window = 5\nlean_threshold = 0.05\n"
        );
        assert!(AppConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_rejects_non_positive_loss_limit() {
        let text = format!("{MINIMAL}\n[guard]\nmax_daily_loss = 0.0\n");
        assert!(AppConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_resolve_env() {
        assert!(AppConfig::resolve_env("WAGER_TEST_UNSET_VAR_91c2").is_err());
        let path = AppConfig::resolve_env("PATH");
        assert_eq!(path.ok(), std::env::var("PATH").ok());
    }

    #[test]
    fn test_rejects_unknown_guard_kind() {
        let text = format!("{MINIMAL}\n[guard]\nkind = \"yolo\"\n");
        assert!(AppConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_load_config_file() {
        // Requires config.toml in the working directory (crate root under cargo test).
        if let Ok(cfg) = AppConfig::load("config.toml") {
            assert!(cfg.ledger.initial_balance >= Decimal::ZERO);
            assert!(cfg.forecast.iterations > 0);
        }
    }
}
