//! # petlink-relay
//!
//! Relay server binary: loads settings, installs logging and metrics, and
//! serves the room relay until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use petlink_server::logging;
use petlink_server::server::RelayServer;
use petlink_server::settings::{self, RelaySettings};

/// PetLink room relay.
#[derive(Parser, Debug)]
#[command(name = "petlink-relay", about = "PetLink room relay server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.petlink/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(settings::settings_path)
    }

    /// Command-line flags win over file and environment.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let path = args.settings_path();
    let mut settings = settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    args.apply(&mut settings);

    logging::init_subscriber(&settings.logging.level, settings.logging.json);
    tracing::debug!(?settings, "settings loaded");

    let metrics = petlink_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let server = RelayServer::new(settings.server).with_metrics(metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!("PetLink relay listening on ws://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().drain(vec![handle], None).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
