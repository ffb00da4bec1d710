//! soloserve: a single-connection TCP server.
//!
//! Demo binary around the server engine. Serves one client with a bundled
//! protocol strategy (ping or echo), configured via CLI arguments or a
//! TOML file.

use soloserve::config::{Config, ProtocolKind};
use soloserve::protocols::{Echo, Ping};
use soloserve::Server;
use std::thread;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        port = config.port,
        protocol = ?config.protocol,
        "Starting soloserve"
    );

    let mut server = match config.protocol {
        ProtocolKind::Ping => Server::new(config.port, Ping::new()),
        ProtocolKind::Echo => Server::new(config.port, Echo::new()),
    };
    server.start()?;

    info!(
        addr = ?server.local_addr(),
        "Serving one connection; terminate the process to exit"
    );

    // The engine serves exactly one client per cycle; keep the process
    // alive until killed.
    loop {
        thread::sleep(Duration::from_secs(60));
    }
}
