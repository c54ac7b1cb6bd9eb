/// Nodeloop: reactive and tick-driven dataflow engine
///
/// Main entry point for the Nodeloop server. Initializes configuration and
/// starts the HTTP server with the node editor API and the tick scheduler.

use nodeloop::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Node editor API at /api/editor/*
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration (defaults to 0.0.0.0:3004, 10 ms ticks)
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
