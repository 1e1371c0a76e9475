//! Binary crate for the `weather` backend.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Serving the HTTP API
//! - Interactive configuration
//! - Human-friendly output formatting

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; missing file is fine.
    let _ = dotenvy::dotenv();
    weather_server::telemetry::init();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
