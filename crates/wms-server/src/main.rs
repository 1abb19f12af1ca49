//! Warehouse command server: entry point.
//!
//! Listens for console connections on two TCP ports, one per frame layout,
//! and answers every request frame with exactly one response frame.
//!
//! # Usage
//!
//! ```text
//! wms-server [OPTIONS]
//!
//! Options:
//!   --config        <PATH>  Settings file [default: wms-server.toml]
//!   --bind          <IP>    Override server.bind_address
//!   --control-port  <PORT>  Override server.control_port (0 disables)
//!   --data-port     <PORT>  Override server.data_port (0 disables)
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable            | Description                         |
//! |---------------------|-------------------------------------|
//! | `WMS_CONFIG`        | Settings file path                  |
//! | `WMS_BIND`          | Bind address                        |
//! | `WMS_CONTROL_PORT`  | Control-frame port                  |
//! | `WMS_DATA_PORT`     | Data-frame port                     |
//! | `RUST_LOG`          | Log filter; overrides `log_level`   |
//!
//! # Architecture overview
//!
//! ```text
//! Console  (7-byte control frames / 17-byte data frames over TCP)
//!       ↕
//! wms-server  ← this process
//!   infrastructure/
//!     network/  listeners, registry, per-connection session loop
//!     storage/  TOML settings
//!   application/
//!     dispatch       request → warehouse operation → response
//!     robot_control  timed robot moves
//!       ↕
//! wms-core  (codec, sector store, robot state machine)
//! ```

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wms_server::application::dispatch::Dispatcher;
use wms_server::infrastructure::network::connection_manager::serve;
use wms_server::infrastructure::storage::config::{load_config, ServerSettings};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Warehouse command server.
#[derive(Debug, Parser)]
#[command(
    name = "wms-server",
    about = "Warehouse command server for control and data frame consoles",
    version
)]
struct Cli {
    /// Path to the TOML settings file.  A missing file means all defaults.
    #[arg(long, default_value = "wms-server.toml", env = "WMS_CONFIG")]
    config: PathBuf,

    /// IP address both listeners bind to.
    #[arg(long, env = "WMS_BIND")]
    bind: Option<String>,

    /// Control-frame port; 0 disables the listener.
    #[arg(long, env = "WMS_CONTROL_PORT")]
    control_port: Option<u16>,

    /// Data-frame port; 0 disables the listener.
    #[arg(long, env = "WMS_DATA_PORT")]
    data_port: Option<u16>,
}

impl Cli {
    /// Loads the settings file and applies command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    fn into_settings(self) -> anyhow::Result<ServerSettings> {
        let mut settings = load_config(&self.config)
            .with_context(|| format!("failed to load settings from {}", self.config.display()))?;

        if let Some(bind) = self.bind {
            settings.server.bind_address = bind;
        }
        if let Some(port) = self.control_port {
            settings.server.control_port = port;
        }
        if let Some(port) = self.data_port {
            settings.server.data_port = port;
        }
        Ok(settings)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Cli::parse().into_settings()?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.server.log_level)),
        )
        .init();

    info!(
        "warehouse server starting: control_port={}, data_port={}, storage_capacity={}",
        settings.server.control_port,
        settings.server.data_port,
        settings.warehouse.storage_capacity
    );

    let dispatcher = Arc::new(Dispatcher::new(settings.build_warehouse()));

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    serve(&settings, dispatcher, running).await?;

    info!("warehouse server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_config() -> String {
        std::env::temp_dir()
            .join(format!("wms-cli-{}.toml", uuid::Uuid::new_v4()))
            .display()
            .to_string()
    }

    #[test]
    fn test_cli_default_config_path() {
        let cli = Cli::parse_from(["wms-server"]);
        assert_eq!(cli.config, PathBuf::from("wms-server.toml"));
        assert!(cli.control_port.is_none());
    }

    #[test]
    fn test_missing_config_file_gives_defaults() {
        // Arrange
        let path = missing_config();
        let cli = Cli::parse_from(["wms-server", "--config", path.as_str()]);

        // Act
        let settings = cli.into_settings().unwrap();

        // Assert
        assert_eq!(settings, ServerSettings::default());
    }

    #[test]
    fn test_port_overrides_apply_on_top_of_file() {
        let path = missing_config();
        let cli = Cli::parse_from([
            "wms-server",
            "--config",
            path.as_str(),
            "--control-port",
            "7000",
            "--data-port",
            "0",
        ]);

        let settings = cli.into_settings().unwrap();

        assert_eq!(settings.server.control_port, 7000);
        assert_eq!(settings.server.data_port, 0);
    }

    #[test]
    fn test_bind_override() {
        let path = missing_config();
        let cli = Cli::parse_from(["wms-server", "--config", path.as_str(), "--bind", "127.0.0.1"]);

        let settings = cli.into_settings().unwrap();

        assert_eq!(settings.server.bind_address, "127.0.0.1");
    }
}
