//! DcaSentinel - Main Entry Point
//!
//! Runs exactly one decision cycle and exits. Periodicity belongs to the
//! external scheduler (cron, systemd timer, ...).

use anyhow::{bail, Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use dca_sentinel::common::types::pair_symbol;
use dca_sentinel::config::load_config;
use dca_sentinel::market::FearGreedClient;
use dca_sentinel::notify::{LogNotifier, TelegramNotifier};
use dca_sentinel::{
    AppConfig, BinanceClient, DcaPipeline, Exchange, ExecutionMode, FearGreedCache, JsonlSessionStore, LlmOracle,
    Notifier,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "DCA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Send real orders instead of simulating fills
    #[arg(long)]
    live: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one decision cycle (default)
    Run,
    /// Cancel every open order for one asset, or for all configured assets
    CancelAll {
        #[arg(long)]
        asset: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let mut config = load_config(Some(&args.config)).context("loading configuration")?;
    if args.live {
        config.execution.mode = ExecutionMode::Live;
    }

    init_logging(args.log_level.as_deref().unwrap_or(&config.settings.log_level), args.json_logs)?;

    info!("Starting DcaSentinel");
    info!("Configuration file: {}", args.config);
    info!(
        "Mode: {}, assets: {}, quote: {}",
        config.execution.mode,
        config.pipeline.assets.join(","),
        config.pipeline.quote_asset
    );

    if config.execution.mode == ExecutionMode::Live && config.exchange.credentials().is_none() {
        bail!("live mode requires BINANCE_API_KEY and BINANCE_API_SECRET");
    }

    let timeout = Duration::from_secs(config.settings.request_timeout_seconds);
    let exchange: Arc<dyn Exchange> = Arc::new(
        BinanceClient::from_config(&config.exchange, timeout)?.with_quote_asset(&config.pipeline.quote_asset),
    );

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_cycle(&config, exchange, timeout).await,
        Command::CancelAll { asset } => cancel_all(&config, exchange, asset).await,
    }
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

async fn run_cycle(config: &AppConfig, exchange: Arc<dyn Exchange>, timeout: Duration) -> Result<()> {
    let oracle = Arc::new(LlmOracle::new(&config.oracle)?);
    let store = Arc::new(JsonlSessionStore::new(&config.session.dir));

    let notifier: Arc<dyn Notifier> = match &config.telegram {
        Some(telegram) if telegram.is_configured() => Arc::new(TelegramNotifier::new(telegram, timeout)?),
        _ => {
            info!("Telegram not configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    };

    // Sentiment cache persists between runs next to the session history
    let cache_path = PathBuf::from(&config.session.dir).join("fear_greed.json");
    let mut cache = FearGreedCache::load(&cache_path).await;
    let fng_client = FearGreedClient::new(&config.sentiment.url, timeout)?;
    let reading = cache
        .resolve(Utc::now(), ChronoDuration::hours(config.sentiment.ttl_hours), || {
            fng_client.fetch()
        })
        .await;
    if let Err(e) = cache.save(&cache_path).await {
        warn!("Failed to save sentiment cache: {}", e);
    }

    let previous_plan = match store.latest_plan().await {
        Ok(plan) => plan,
        Err(e) => {
            warn!("Could not read previous plan: {}", e);
            None
        }
    };

    let pipeline = DcaPipeline::new(config, exchange, oracle, store, notifier);
    let session = pipeline.run_cycle(Some(reading), previous_plan).await?;

    info!("Session {}: {}", session.id, session);
    if !session.was_successful() {
        error!("Cycle did not complete cleanly");
        std::process::exit(2);
    }
    Ok(())
}

async fn cancel_all(config: &AppConfig, exchange: Arc<dyn Exchange>, asset: Option<String>) -> Result<()> {
    let quote = config.pipeline.quote_asset.to_uppercase();
    let assets = match asset {
        Some(asset) => vec![asset.to_uppercase()],
        None => config.pipeline.assets.iter().map(|a| a.to_uppercase()).collect(),
    };

    let executor = dca_sentinel::Executor::new(exchange, config.execution.clone(), &quote);
    let mode = executor.mode();
    if mode == ExecutionMode::DryRun {
        warn!("cancel-all in dry_run mode: no cancel is sent to the exchange, pass --live to cancel");
    }
    for asset in assets {
        let pair = pair_symbol(&asset, &quote);
        for result in executor.cancel_all(&pair).await? {
            if result.success {
                info!("[{}] cancelled {} on {}", mode, result.order_id.as_deref().unwrap_or("-"), pair);
            } else {
                warn!(
                    "Cancel failed on {}: {}",
                    pair,
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
    }
    Ok(())
}
