use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber: `RUST_LOG` filter (default `info`), stderr output.
pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
