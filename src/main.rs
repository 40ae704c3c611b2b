use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod models;
mod refresher;
mod scheduler;
mod services;

use config::AppConfig;
use refresher::EpisodeRefresher;
use services::jellyfin::JellyfinClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before tracing so RUST_LOG can live there too)
    dotenvy::dotenv().ok();

    // Warnings and errors go to stderr, everything else to stdout
    let writer = std::io::stderr
        .with_max_level(tracing::Level::WARN)
        .or_else(std::io::stdout);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "episode_refresher=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();

    let config = AppConfig::load();
    let server_url = config.validate()?;
    let tz = config.timezone()?;
    config.log_config();

    let api_key = config.api_key.as_deref().unwrap_or_default();
    let client = Arc::new(JellyfinClient::new(&server_url, api_key));

    let shutdown = CancellationToken::new();
    let refresher = Arc::new(EpisodeRefresher::new(client, config.days, shutdown.clone()));

    let mut scheduler = scheduler::start_scheduler(&config.cron, tz, refresher.clone()).await?;

    if config.run_on_startup {
        let startup = refresher.clone();
        tokio::spawn(async move {
            tracing::info!("Running startup scan...");
            scheduler::run_tick(startup.as_ref()).await;
        });
    }

    // Wait for a shutdown signal
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }

    // Stop a running scan between episodes, then stop the scheduler
    shutdown.cancel();
    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!("Scheduler did not shut down cleanly: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
