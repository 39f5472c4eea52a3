//! External vault balance guard.
//!
//! Queries an EVM JSON-RPC endpoint (`eth_getBalance`) for the vault address
//! and approves only while the externally-held balance is nonzero. The RPC
//! URL usually embeds a provider key, so it is held as a secret.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{GuardVerdict, PreflightGuard};

/// Per-request HTTP timeout. The caller's guard timeout still bounds the
/// whole check.
const HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub struct RpcBalanceGuard {
    http: Client,
    rpc_url: SecretString,
    address: String,
}

impl RpcBalanceGuard {
    pub fn new(rpc_url: SecretString, address: String) -> Result<Self> {
        if !is_evm_address(&address) {
            anyhow::bail!("Invalid vault address: {address}");
        }

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .user_agent("wager-engine/0.1.0 (preflight-guard)")
            .build()
            .context("Failed to build HTTP client for RPC guard")?;

        Ok(Self {
            http,
            rpc_url,
            address,
        })
    }

    /// Current external balance in wei.
    pub async fn fetch_balance(&self) -> Result<u128> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getBalance",
            "params": [self.address, "latest"],
        });

        let resp = self
            .http
            .post(self.rpc_url.expose_secret().as_str())
            .json(&body)
            .send()
            .await
            .context("RPC balance request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("RPC error {status}: {text}");
        }

        let parsed: RpcResponse = resp
            .json()
            .await
            .context("Failed to parse eth_getBalance response")?;

        if let Some(err) = parsed.error {
            anyhow::bail!("RPC returned error {}: {}", err.code, err.message);
        }
        let hex = parsed.result.context("eth_getBalance response has no result")?;
        parse_wei(&hex)
    }
}

#[async_trait]
impl PreflightGuard for RpcBalanceGuard {
    async fn check(&self) -> Result<GuardVerdict> {
        let wei = self.fetch_balance().await?;
        debug!(address = %self.address, wei, "External vault balance");
        if wei == 0 {
            Ok(GuardVerdict::veto(format!("vault {} holds no funds", self.address)))
        } else {
            Ok(GuardVerdict::approve(format!("vault holds {wei} wei")))
        }
    }

    fn name(&self) -> &'static str {
        "rpc-balance"
    }
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_wei(hex: &str) -> Result<u128> {
    let digits = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .with_context(|| format!("Quantity is not 0x-prefixed: {hex:?}"))?;
    if digits.is_empty() {
        anyhow::bail!("Empty hex quantity");
    }
    u128::from_str_radix(digits, 16).with_context(|| format!("Invalid hex quantity: {hex:?}"))
}

fn is_evm_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}
