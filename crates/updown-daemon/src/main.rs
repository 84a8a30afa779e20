//! Settlement engine daemon - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Up/down trading session settlement engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via UPDOWN_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Determine config path: CLI arg > UPDOWN_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("UPDOWN_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    let config = updown_daemon::AppConfig::from_file(&config_path)?;
    updown_telemetry::init_logging(&config.telemetry.log_level)?;

    info!("Starting updown-daemon v{}", env!("CARGO_PKG_VERSION"));
    info!(config_path = %config_path, asset = %config.engine.asset, "Configuration loaded");

    let app = updown_daemon::Application::new(config)?;
    app.run().await?;

    info!("Shutdown complete");
    Ok(())
}
