//! TIPSTER — Autonomous sports-betting recommendation & ledger agent
//!
//! Entry point. Loads configuration, initialises structured logging,
//! opens the SQLite ledger, registers prediction sources, and runs the
//! refresh→select→record→grade scheduler loop with graceful shutdown.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use tipster::config::AppConfig;
use tipster::dashboard::{self, routes::DashboardState};
use tipster::data::odds_api::TheOddsApiClient;
use tipster::ingest::OddsIngestor;
use tipster::ledger::{self, LedgerScheduler};
use tipster::models::baseline::{FormModel, MarketModel};
use tipster::models::EnsemblePredictor;
use tipster::selector::TopSelector;
use tipster::store::Store;

const BANNER: &str = r#"
 _____ ___ ____  ____ _____ _____ ____
|_   _|_ _|  _ \/ ___|_   _| ____|  _ \
  | |  | || |_) \___ \ | | |  _| | |_) |
  | |  | ||  __/ ___) || | | |___|  _ <
  |_| |___|_|   |____/ |_| |_____|_| \_\

  Top-pick Selection, Tracking & Evaluated Returns
  v0.1.0 — Autonomous Agent
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        record_interval_secs = cfg.scheduler.record_interval_secs,
        grade_interval_secs = cfg.scheduler.grade_interval_secs,
        odds_refresh_interval_secs = cfg.scheduler.odds_refresh_interval_secs,
        demo_mode = cfg.selection.demo_mode,
        "TIPSTER starting up"
    );

    // -- Initialise components -------------------------------------------

    let store = Store::connect(&cfg.database.url).await?;

    // Prediction sources. One-time registration; the ensemble is read-only
    // afterwards and shared across the scheduler and any manual triggers.
    let mut ensemble = EnsemblePredictor::new();
    ensemble.register("market", cfg.models.market_weight, Box::new(MarketModel::new()));
    ensemble.register("form", cfg.models.form_weight, Box::new(FormModel::new()));
    let ensemble = Arc::new(ensemble);
    info!(sources = ensemble.source_count(), "Prediction ensemble ready");

    // Odds feed client (also the score provider)
    let api_key = std::env::var(&cfg.odds_feed.api_key_env).unwrap_or_default();
    if api_key.is_empty() {
        warn!(
            env = %cfg.odds_feed.api_key_env,
            "No odds API key configured — feed calls will fail until one is provided"
        );
    }
    let odds_client = Arc::new(TheOddsApiClient::new(api_key)?);

    let selector = TopSelector::new(store.clone(), ensemble.clone(), cfg.selector_config());
    let ingestor = OddsIngestor::new(odds_client.clone(), store.clone(), cfg.ingest_config());

    let scheduler = LedgerScheduler::new(
        store.clone(),
        selector,
        ingestor,
        odds_client,
        cfg.scheduler_config(),
    );

    // Dashboard (read-only monitoring)
    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(store.clone()));
        dashboard::spawn_dashboard(state, cfg.dashboard.port)?;
    }

    // -- Main loop -------------------------------------------------------

    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(scheduler.run(stop_rx));

    info!("Scheduler running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    // The in-flight tick completes before the loop exits.
    let _ = stop_tx.send(true);
    scheduler_handle.await?;

    // Final P&L snapshot
    match ledger::ledger_summary(&store).await {
        Ok(summary) => info!(%summary, "TIPSTER shut down cleanly."),
        Err(e) => warn!(error = %e, "Could not compute final ledger summary"),
    }

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tipster=info"));

    let json_logging = std::env::var("TIPSTER_LOG_JSON").is_ok();

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
