use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use torn_market_tracker::commands::Tracker;
use torn_market_tracker::config::AppConfig;
use torn_market_tracker::market::client::TornClient;
use torn_market_tracker::market::MarketFetcher;
use torn_market_tracker::monitoring::alerts::DiscordNotifier;
use torn_market_tracker::monitoring::health::{spawn_health_server, HealthState};
use torn_market_tracker::monitoring::logger;
use torn_market_tracker::tracking::registry::TrackingRegistry;
use torn_market_tracker::tracking::scheduler::PollScheduler;

/// Watch the Torn item market for listings at chosen quality values and
/// report changes to a Discord channel.
#[derive(Debug, Parser)]
#[command(name = "torn-market-tracker")]
struct Cli {
    /// Comma-separated item ids to track (e.g. 219,220)
    #[arg(long)]
    items: String,

    /// Comma-separated quality values to alert on (e.g. 110.5,112.33)
    #[arg(long)]
    qualities: String,

    /// Chat-platform user id mentioned when a listing vanishes
    #[arg(long)]
    user: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, secrets) = AppConfig::load()?;

    logger::init_logging(&config.monitoring)?;

    let api_key = secrets
        .torn_api_key
        .context("TORN_API_KEY is not set")?;

    let fetcher: Arc<dyn MarketFetcher> = Arc::new(TornClient::new(&config.torn, api_key)?);
    let notifier = Arc::new(DiscordNotifier::new(
        secrets.discord_webhook_url,
        config.monitoring.discord_enabled,
    ));

    tracing::info!(
        poll_interval_s = config.bot.poll_interval_seconds,
        alerts_enabled = notifier.is_enabled(),
        "Torn market tracker starting"
    );

    let health = HealthState::new();
    let health_handle = spawn_health_server(health.clone());

    let registry = Arc::new(TrackingRegistry::new());
    let scheduler = Arc::new(PollScheduler::new(
        registry.clone(),
        fetcher.clone(),
        notifier,
        Duration::from_secs(config.bot.poll_interval_seconds),
        health,
    ));
    let tracker = Tracker::new(registry, fetcher, scheduler.clone());

    let started = tracker
        .start_tracking(&cli.items, &cli.qualities, cli.user)
        .await?;
    tracing::info!(%started, "Initial track request accepted");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    scheduler.cancel();
    health_handle.abort();

    Ok(())
}
