//! Headless warehouse console: entry point.
//!
//! # Usage
//!
//! ```text
//! wms-console [--addr HOST:PORT] [--variant control|data] watch [--interval SECS]
//! wms-console [--addr HOST:PORT] [--variant control|data] send <CODE> [--value N]
//! ```
//!
//! `watch` polls the all-stock query until Ctrl+C, reconnecting with
//! back-off whenever the server goes away.  `send` performs a single
//! exchange and prints the status and payload.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wms_core::FrameVariant;
use wms_console::application::poll_stock::poll_all_stock;
use wms_console::infrastructure::connection::ConsoleConnection;
use wms_console::infrastructure::reconnect::ReconnectingConsole;

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VariantArg {
    Control,
    Data,
}

impl From<VariantArg> for FrameVariant {
    fn from(v: VariantArg) -> Self {
        match v {
            VariantArg::Control => FrameVariant::Control,
            VariantArg::Data => FrameVariant::Data,
        }
    }
}

/// Headless console for the warehouse command server.
#[derive(Debug, Parser)]
#[command(name = "wms-console", about = "Headless warehouse console", version)]
struct Cli {
    /// Server address.
    #[arg(long, default_value = "127.0.0.1:9999", env = "WMS_ADDR")]
    addr: SocketAddr,

    /// Frame layout the server port speaks.
    #[arg(long, value_enum, default_value_t = VariantArg::Control, env = "WMS_VARIANT")]
    variant: VariantArg,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll all stock until Ctrl+C.
    Watch {
        /// Seconds between polls.
        #[arg(long, default_value_t = 2)]
        interval: u64,
    },
    /// Send one command and print the response.
    Send {
        /// Two-letter command code, e.g. `RE` or `AI`.
        code: String,
        /// Numeric argument: quantity, color code or robot position.
        #[arg(long)]
        value: Option<u32>,
    },
}

/// Builds the request payload for `code` from the optional `--value`.
///
/// Quantities go out as u32 (control) or u16 (data); color codes and robot
/// positions occupy the first payload byte.
fn payload_for(variant: FrameVariant, code: &str, value: Option<u32>) -> anyhow::Result<Vec<u8>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let single_byte = matches!(code, "CI" | "SH" | "SO" | "SM" | "RM");
    if single_byte {
        let byte = u8::try_from(value).context("value does not fit in one byte")?;
        return Ok(vec![byte]);
    }
    Ok(match variant {
        FrameVariant::Control => value.to_be_bytes().to_vec(),
        FrameVariant::Data => u16::try_from(value)
            .context("data-frame values are 16-bit")?
            .to_be_bytes()
            .to_vec(),
    })
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let variant = FrameVariant::from(cli.variant);

    match cli.command {
        Command::Watch { interval } => {
            let running = Arc::new(AtomicBool::new(true));
            let running_clone = Arc::clone(&running);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("received Ctrl+C; stopping");
                    running_clone.store(false, Ordering::Relaxed);
                }
            });

            let mut console = ReconnectingConsole::new(cli.addr, variant);
            poll_all_stock(
                &mut console,
                Duration::from_secs(interval),
                running,
                |_| {},
            )
            .await;
        }
        Command::Send { code, value } => {
            let payload = payload_for(variant, &code, value)?;
            let mut conn = ConsoleConnection::connect(cli.addr, variant).await?;
            let response = conn
                .request(&code, &payload)
                .await
                .with_context(|| format!("{code} request failed"))?;
            println!(
                "{} {:?} {:02X?}",
                response.frame.command, response.frame.status, response.frame.payload
            );
        }
    }
    Ok(())
}
