//! coinboard - headless market dashboard core.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

/// Live order-book and market classification dashboard (headless).
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via COINBOARD_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Symbol to stream (repeatable); overrides `feed.symbols`
    #[arg(short, long = "symbol")]
    symbols: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Must run before any TLS connection is opened.
    coinboard_ws::init_crypto();

    let args = Args::parse();

    coinboard_telemetry::init_logging()?;

    info!("Starting coinboard v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > COINBOARD_CONFIG > default
    let config =
        coinboard_app::AppConfig::load(args.config.as_deref())?.with_symbols(args.symbols)?;
    info!(symbols = ?config.feed.symbols, "Configuration loaded");

    let app = Arc::new(coinboard_app::Application::new(config)?);

    let signal_app = Arc::clone(&app);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_app.shutdown(),
            Err(e) => error!(error = %e, "Failed to listen for ctrl-c"),
        }
    });

    app.run().await?;

    Ok(())
}
