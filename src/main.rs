//! wager-engine — atomic HIGH/LOW wager service.
//!
//! Entry point. Loads configuration, initialises structured logging, opens
//! (or creates) the ledger, wires forecast, guard and executor together, and
//! serves the HTTP API until Ctrl+C.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use wager_engine::api::{self, ApiState};
use wager_engine::config::AppConfig;
use wager_engine::engine::WagerExecutor;
use wager_engine::guard;
use wager_engine::storage::draw::{DrawSource, UniformDraw};
use wager_engine::storage::Ledger;
use wager_engine::strategy::{ForecastEngine, SizingConfig, StakeSizer};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    let range = cfg.value_range()?;
    info!(
        config = %config_path,
        database = %cfg.ledger.database_path,
        range = %range,
        guard = ?cfg.guard.kind,
        "wager-engine starting up"
    );

    // -- Ledger ----------------------------------------------------------

    let draws: Box<dyn DrawSource> = match cfg.ledger.seed {
        Some(seed) => {
            warn!(seed, "Ledger draws are seeded; outcomes are reproducible");
            Box::new(UniformDraw::seeded(seed))
        }
        None => Box::new(UniformDraw::from_entropy()),
    };
    let ledger = Arc::new(
        Ledger::open(
            &cfg.ledger.database_path,
            cfg.ledger.initial_balance,
            range,
            draws,
        )
        .await?,
    );

    // -- Engine ----------------------------------------------------------

    let forecaster = ForecastEngine::new(cfg.forecast.iterations, range, cfg.forecast.seed);
    let preflight = guard::from_config(&cfg.guard).context("Failed to build preflight guard")?;
    info!(
        guard = preflight.name(),
        timeout_ms = cfg.guard.timeout_ms,
        max_daily_loss = ?cfg.guard.max_daily_loss,
        "Preflight guard ready"
    );

    let executor = WagerExecutor::new(
        ledger.clone(),
        forecaster,
        preflight,
        cfg.guard.timeout(),
        cfg.forecast.history_window,
    )
    .with_daily_loss_limit(cfg.guard.max_daily_loss);
    let executor = Arc::new(executor);

    let opening_balance = ledger.read_balance().await.ok();
    let state = Arc::new(ApiState::new(
        executor,
        StakeSizer::new(SizingConfig::from(&cfg.sizing)),
        cfg.forecast.lean_threshold,
        opening_balance,
    ));

    // -- Serve -----------------------------------------------------------

    let addr: SocketAddr = format!("{}:{}", cfg.api.bind, cfg.api.port)
        .parse()
        .with_context(|| format!("Invalid API address {}:{}", cfg.api.bind, cfg.api.port))?;

    info!("Serving. Press Ctrl+C to stop.");
    api::serve(state.clone(), addr, shutdown_signal()).await?;

    // -- Shutdown --------------------------------------------------------

    let tally = state.tally.read().await.clone();
    let balance = ledger.read_balance().await.ok();
    ledger.close().await;
    info!(
        balance = ?balance,
        settled = tally.settled,
        won = tally.won,
        net_pnl = %tally.net_pnl,
        "wager-engine shut down cleanly."
    );

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received."),
        Err(e) => warn!(error = %e, "Failed to listen for Ctrl+C; shutting down"),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wager_engine=info"));

    let json_logging = std::env::var("WAGER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
