mod bot;
mod config;
mod net;
mod platform;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::CommandDispatcher;
use crate::config::Config;
use crate::net::NetResolver;
use crate::platform::telegram::TelegramPlatform;

const QUEUE_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,ipbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Owner: {}", config.owner_id);
    info!("  Public IP service: {}", config.public_ip_url);
    info!("  Probe address: {}", config.probe_address);

    let resolver = Arc::new(NetResolver::new(&config)?);

    let platform = Arc::new(TelegramPlatform::connect(&config.token).await?);
    platform.register_commands().await;

    let stop = CancellationToken::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Ctrl-C received, shutting down");
                    stop.cancel();
                }
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
        });
    }

    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let polling = {
        let platform = platform.clone();
        let stop = stop.clone();
        tokio::spawn(async move { platform.run_polling(tx, stop).await })
    };

    let dispatcher = CommandDispatcher::new(
        config.owner_id,
        platform.username(),
        resolver,
        Arc::new(platform.replies()),
    );

    info!("Bot is starting...");
    dispatcher.run(rx, stop.clone()).await;

    stop.cancel();
    polling.await.context("Polling task panicked")?;

    Ok(())
}
