//! Futures Trailing Bot - Main Entry Point
//!
//! Runs the position manager against Binance USDⓈ-M futures, or performs
//! one-shot operations (open a position, inspect the heartbeat, validate
//! configuration).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use futures_trailing_bot::config::load_config;
use futures_trailing_bot::engine::{HealthStatus, PositionManager};
use futures_trailing_bot::notify::build_notifier;
use futures_trailing_bot::store::PositionStore;
use futures_trailing_bot::{AppConfig, BinanceFuturesClient, PositionSide, RiskResolver};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "APP_CONFIG")]
    config: String,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the polling loop until Ctrl-C
    Run,
    /// Open a position sized from the risk table
    Open {
        symbol: String,
        /// LONG or SHORT
        side: PositionSide,
        /// Limit price; market order when omitted
        #[arg(long)]
        price: Option<Decimal>,
    },
    /// Report the last heartbeat from the state file
    Status {
        /// Seconds without a tick before the bot counts as stale
        #[arg(long)]
        max_age: Option<i64>,
    },
    /// Load and validate configuration, then exit
    CheckConfig,
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
    .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let config = load_config(Some(&args.config)).context("loading configuration")?;
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    init_logging(&level, args.json_logs)?;

    info!("Configuration file: {}", args.config);

    match args.command {
        Command::Run => run(config).await,
        Command::Open { symbol, side, price } => open(config, &symbol, side, price).await,
        Command::Status { max_age } => status(&config, max_age),
        Command::CheckConfig => check_config(&config),
    }
}

fn build_manager(config: &AppConfig) -> Result<PositionManager> {
    if config.binance.credentials().is_none() {
        bail!("BINANCE_API_KEY and BINANCE_API_SECRET must be set");
    }
    let exchange = Arc::new(BinanceFuturesClient::from_config(&config.binance)?);
    let notifier = build_notifier(config.telegram.as_ref())?;
    Ok(PositionManager::new(config, exchange, notifier)?)
}

async fn run(config: AppConfig) -> Result<()> {
    info!("Starting futures trailing bot");
    let mut manager = build_manager(&config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("Received shutdown signal, finishing current tick...");
        let _ = shutdown_tx.send(true);
    });

    manager.run(shutdown_rx).await?;
    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM from a process supervisor
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received"),
        _ = terminate => info!("SIGTERM received"),
    }
}

async fn open(config: AppConfig, symbol: &str, side: PositionSide, price: Option<Decimal>) -> Result<()> {
    let mut manager = build_manager(&config)?;
    // adopt whatever is already open so the new position does not collide
    if let Err(e) = manager.reconcile().await {
        warn!(error = %e, "reconcile before open failed");
    }

    let outcome = manager.open_position(&symbol.to_uppercase(), side, price).await?;
    match outcome.position {
        Some(position) => println!("{}", serde_json::to_string_pretty(&position)?),
        None => println!(
            "limit order {} resting, the position is tracked once filled",
            outcome.order.order_id
        ),
    }
    Ok(())
}

fn status(config: &AppConfig, max_age: Option<i64>) -> Result<()> {
    let store = PositionStore::new(&config.settings.state_file);
    let snapshot = store.load()?;
    let health = HealthStatus::from_snapshot(&snapshot);
    let max_age = chrono::Duration::seconds(
        max_age.unwrap_or(config.settings.poll_interval_seconds as i64 * 3),
    );

    println!("{}", serde_json::to_string_pretty(&health)?);
    if health.is_stale(chrono::Utc::now(), max_age) {
        bail!("no tick within {} seconds", max_age.num_seconds());
    }
    Ok(())
}

fn check_config(config: &AppConfig) -> Result<()> {
    let resolver = RiskResolver::from_config(&config.risk)?;
    futures_trailing_bot::sltp::SltpCalculator::new(config.sltp.clone())?;
    futures_trailing_bot::trailing::TrailingParams::for_regime(&config.trailing, None).validate()?;

    println!("risk brackets:");
    for bracket in resolver.brackets() {
        println!(
            "  balance <= {}: risk {} leverage {}x sl {} tp {}",
            bracket.max_balance, bracket.risk_per_trade, bracket.leverage, bracket.sl_pct, bracket.tp_pct
        );
    }
    if config.binance.credentials().is_none() {
        println!("warning: no Binance credentials configured");
    }
    println!("configuration ok");
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::signal::unix::{signal, SignalKind};

    #[tokio::test]
    async fn test_sigterm_resolves_shutdown_wait() {
        // keeps the process alive if the signal lands before the waiter subscribes
        let _guard = signal(SignalKind::terminate()).unwrap();
        let waiter = tokio::spawn(wait_for_shutdown_signal());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let finished = tokio::time::timeout(Duration::from_secs(5), waiter).await;
        assert!(matches!(finished, Ok(Ok(()))));
    }
}
