//! segue-player - main entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use segue_player::api::{self, AppContext};
use segue_player::media::{ClockedBackend, HttpFetcher};
use segue_player::config::LoggingConfig;
use segue_player::{PlaybackEngine, PlayerConfig};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for segue-player
#[derive(Parser, Debug)]
#[command(name = "segue-player")]
#[command(about = "Gapless segment player for a live-rendered mix")]
#[command(version)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "SEGUE_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "SEGUE_PORT")]
    port: Option<u16>,

    /// Base URL of the segment producer (overrides the config file)
    #[arg(long, env = "SEGUE_PRODUCER_URL")]
    producer_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Tracing starts at the default level; the configured level replaces it
    // once the config file is read. RUST_LOG wins over both.
    let (filter, filter_handle) = reload::Layer::new(log_filter(&LoggingConfig::default()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = PlayerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(producer_url) = args.producer_url {
        config.producer_url = producer_url;
    }
    filter_handle
        .reload(log_filter(&config.logging))
        .context("Failed to apply logging level")?;

    info!("Starting segue-player v{} on port {}", env!("CARGO_PKG_VERSION"), config.port);
    info!("Producer: {}", config.producer_url);

    let controller_config = config
        .playback
        .to_controller_config()
        .context("Invalid playback settings")?;

    let fetcher = Arc::new(HttpFetcher::new(&config.producer_url).context("Failed to create segment fetcher")?);
    let backend = Arc::new(ClockedBackend::new(fetcher, config.media.clone()));

    let (handle, engine_task) = PlaybackEngine::start(controller_config, backend);
    info!("Playback engine started");

    let ctx = AppContext::new(handle.clone());
    api::run(config.port, ctx, shutdown_signal())
        .await
        .context("Server error")?;

    handle.shutdown();
    if let Err(e) = engine_task.await {
        error!("Playback engine task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

fn log_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(logging.filter_directives()))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
