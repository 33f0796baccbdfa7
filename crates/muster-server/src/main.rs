//! # Muster Server
//!
//! Headless authoritative server for Muster.
//!
//! Runs one simulation session:
//! - Config: session and simulation parameters from TOML
//! - Timing: fixed-timestep tick pacing
//! - Session: population, observers, lobby and the tick loop

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

mod config;
mod session;
mod timing;

use anyhow::Result;
use config::{ServerConfig, CONFIG_FILE};
use session::Session;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Main entry point.
fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("muster=info".parse()?))
        .init();

    info!("Muster server starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let arg = std::env::args().nth(1);
    if arg.as_deref() == Some("--init") {
        ServerConfig::default().save_to(CONFIG_FILE)?;
        return Ok(());
    }
    let path = arg.unwrap_or_else(|| CONFIG_FILE.to_string());
    let config = ServerConfig::load_from(&path);

    let mut session = Session::new(config);
    let summary = session.run()?;

    info!(
        "Muster server shutdown complete ({} ticks, {} groups committed)",
        summary.ticks, summary.groups_committed
    );
    Ok(())
}
