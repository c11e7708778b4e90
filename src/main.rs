use anyhow::Result;
use tracing::info;

use castor_uci::UciEngine;

fn main() -> Result<()> {
    // Stdout carries the UCI protocol; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("castor starting");
    UciEngine::new().run()?;
    Ok(())
}
