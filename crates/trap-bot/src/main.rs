//! Trap cycle bot - Entry Point

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Multi-symbol trap cycle bot
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via TRAP_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Also append logs to this file (can also be set via TRAP_LOG_FILE env var)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_file = args
        .log_file
        .or_else(|| std::env::var_os("TRAP_LOG_FILE").map(PathBuf::from));
    trap_telemetry::init_logging(log_file.as_deref())?;

    info!("Starting trap cycle bot v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > TRAP_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("TRAP_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = trap_bot::AppConfig::load(&config_path)?;
    info!(
        symbols = config.symbols.len(),
        trading_hours = %config.trading_hours,
        "Configuration loaded"
    );

    let app = trap_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}
