//! Companion Daemon - Hosts the Mood Correlator for an Editor
//!
//! The editor plugin connects over a Unix socket, streams what happens in the
//! editor, and renders the overlay commands it gets back.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults
//! companion-daemon
//!
//! # Custom socket path and settings file
//! companion-daemon --socket-path /tmp/companion.sock --config ~/companion.toml
//!
//! # Verbose logging
//! RUST_LOG=debug companion-daemon
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown (closes the session, removes the socket)
//! - `SIGHUP`: Reload settings

mod protocol;
mod server;
mod session;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info};

use companion_core::settings::default_settings_path;
use companion_core::SharedSettings;

use server::{CompanionServer, Control};

/// Companion Daemon - mood overlays for your editor
#[derive(Parser, Debug)]
#[command(name = "companion-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Unix socket path for the editor connection
    #[arg(short = 's', long, env = "COMPANION_SOCKET", value_name = "PATH")]
    socket_path: Option<PathBuf>,

    /// Settings file path
    #[arg(short = 'c', long, env = "COMPANION_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "COMPANION_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Get the default socket path
///
/// Uses the user's runtime directory if there is one, otherwise the temp dir.
fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("companion")
        .join("companion.sock")
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "companion_daemon={level},companion_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

/// Forward SIGHUP/SIGINT/SIGTERM to the server loop
fn spawn_signal_handler(control: mpsc::Sender<Control>) -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;

    tokio::spawn(async move {
        loop {
            let request = tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating shutdown");
                    Control::Shutdown
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating shutdown");
                    Control::Shutdown
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, reloading settings");
                    Control::Reload
                }
            };
            if control.send(request).await.is_err() || request == Control::Shutdown {
                break;
            }
        }
    });

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("Companion daemon starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let socket_path = args.socket_path.unwrap_or_else(default_socket_path);
    info!(socket_path = ?socket_path, "Socket path");

    let settings_path = args.config.or_else(default_settings_path);
    let settings = SharedSettings::load(settings_path.clone()).context("Failed to load settings")?;
    info!(path = ?settings_path, "Settings loaded");

    let (control_tx, control_rx) = mpsc::channel(8);
    spawn_signal_handler(control_tx)?;

    let mut server = CompanionServer::new(socket_path, settings);
    match server.run(control_rx).await {
        Ok(()) => {
            info!("Companion daemon stopped cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Daemon stopped with error");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "companion-daemon",
            "--socket-path",
            "/tmp/c.sock",
            "-c",
            "/tmp/c.toml",
        ]);
        assert_eq!(args.socket_path, Some(PathBuf::from("/tmp/c.sock")));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
        assert_eq!(args.log_level, "info");
    }

    #[test]
    fn test_default_socket_path() {
        assert!(default_socket_path().ends_with("companion/companion.sock"));
    }
}
