//! Daemon Server Implementation
//!
//! This module provides the server loop for the companion daemon:
//! - Accepts editor connections on a Unix socket
//! - Runs one editor session at a time; extra connections are turned away
//! - Reloads settings on request and tells the live session
//! - Supports graceful shutdown
//!
//! ```text
//!            CompanionServer
//!                  │
//!            (one session)
//!                  │
//!   editor ──JSON lines──▶ Session ──▶ EventCorrelator
//!   editor ◀──overlays──── ChannelSurface
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use companion_core::SharedSettings;

use crate::protocol::{decode_line, encode_line, ClientMessage, ProtocolError, ServerMessage};
use crate::session::Session;

/// Requests from the signal handler to the server loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    /// Re-read the settings file (SIGHUP)
    Reload,
    /// Stop accepting and shut down (SIGINT/SIGTERM)
    Shutdown,
}

/// The live session, shared between the server loop and its connection task
type SessionSlot = Arc<Mutex<Option<Session>>>;

/// The companion daemon server
pub struct CompanionServer {
    /// Path to the Unix socket
    socket_path: PathBuf,
    /// Shared, reloadable settings
    settings: SharedSettings,
    /// Session of the connected editor, once it said hello
    session: SessionSlot,
    /// Task serving the connected editor
    connection: Option<JoinHandle<()>>,
}

impl CompanionServer {
    /// Create a new server
    #[must_use]
    pub fn new(socket_path: PathBuf, settings: SharedSettings) -> Self {
        Self {
            socket_path,
            settings,
            session: Arc::new(Mutex::new(None)),
            connection: None,
        }
    }

    /// Prepare the socket path (create directory, remove stale socket)
    fn prepare_socket(&self) -> Result<()> {
        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create socket directory: {parent:?}"))?;
                info!(path = ?parent, "Created socket directory");
            }
        }

        if self.socket_path.exists() {
            warn!(path = ?self.socket_path, "Removing stale socket file");
            std::fs::remove_file(&self.socket_path).with_context(|| {
                format!("Failed to remove stale socket: {:?}", self.socket_path)
            })?;
        }

        Ok(())
    }

    /// Bind the socket and serve until told to shut down
    pub async fn run(&mut self, mut control: mpsc::Receiver<Control>) -> Result<()> {
        self.prepare_socket()?;

        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind to {:?}", self.socket_path))?;
        restrict_permissions(&self.socket_path)?;

        info!(path = ?self.socket_path, "Listening for editor connections");

        loop {
            tokio::select! {
                request = control.recv() => match request {
                    Some(Control::Reload) => self.reload_settings().await,
                    Some(Control::Shutdown) | None => {
                        info!("Shutdown requested, stopping accept loop");
                        break;
                    }
                },
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => self.accept(stream),
                    Err(e) => error!(error = %e, "Accept failed"),
                },
            }
        }

        self.shutdown()
    }

    /// Serve a new connection, or turn it away while another session is live
    fn accept(&mut self, stream: UnixStream) {
        if self.connection.as_ref().is_some_and(|task| !task.is_finished()) {
            warn!("Editor session already active, rejecting connection");
            tokio::spawn(reject(stream, ProtocolError::SessionBusy));
            return;
        }

        info!("Editor connected");
        let task = tokio::spawn(
            handle_connection(stream, self.settings.clone(), Arc::clone(&self.session))
                .instrument(tracing::info_span!("session")),
        );
        self.connection = Some(task);
    }

    /// Re-read settings and notify the live session
    async fn reload_settings(&self) {
        match self.settings.reload_async().await {
            Ok(true) => {
                info!("Settings changed, notifying session");
                if let Some(session) = self.session.lock().as_ref() {
                    session.settings_reloaded();
                }
            }
            Ok(false) => debug!("Settings unchanged"),
            Err(e) => warn!(error = %e, "Settings reload failed, keeping previous settings"),
        }
    }

    /// Graceful shutdown
    fn shutdown(&mut self) -> Result<()> {
        info!("Initiating graceful shutdown");

        if let Some(session) = self.session.lock().take() {
            session.close();
        }
        if let Some(task) = self.connection.take() {
            task.abort();
        }

        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .with_context(|| format!("Failed to remove socket: {:?}", self.socket_path))?;
            info!(path = ?self.socket_path, "Socket file removed");
        }

        info!("Shutdown complete");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(0o600);
    std::fs::set_permissions(path, perms)
        .with_context(|| format!("Failed to restrict socket permissions: {path:?}"))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Tell a surplus client why it is being dropped
async fn reject(stream: UnixStream, reason: ProtocolError) {
    let (_read, mut write) = stream.into_split();
    if let Err(e) = send(&mut write, &ServerMessage::error(&reason)).await {
        debug!(error = %e, "Failed to send rejection");
    }
}

async fn send(write: &mut OwnedWriteHalf, message: &ServerMessage) -> Result<()> {
    let line = encode_line(message).context("Failed to encode message")?;
    write.write_all(&line).await.context("Write failed")?;
    Ok(())
}

/// Serve one editor connection until it closes
///
/// The first line must be `hello`. Afterwards client messages are applied to
/// the session and overlay commands are written back as they arrive.
async fn handle_connection(stream: UnixStream, settings: SharedSettings, slot: SessionSlot) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let shell_integration = match lines.next_line().await {
        Ok(Some(line)) => match decode_line(&line) {
            Ok(ClientMessage::Hello { shell_integration }) => shell_integration,
            Ok(_) => {
                warn!("First message was not hello, closing");
                let _ = send(
                    &mut write_half,
                    &ServerMessage::error(&ProtocolError::HandshakeRequired),
                )
                .await;
                return;
            }
            Err(e) => {
                warn!(error = %e, "Malformed handshake, closing");
                let _ = send(&mut write_half, &ServerMessage::error(&e)).await;
                return;
            }
        },
        Ok(None) => {
            info!("Editor disconnected before hello");
            return;
        }
        Err(e) => {
            error!(error = %e, "Read error during handshake");
            return;
        }
    };

    let (session, mut overlays) = match Session::start(settings, shell_integration) {
        Ok(started) => started,
        Err(e) => {
            error!(error = %e, "Failed to start session");
            return;
        }
    };
    *slot.lock() = Some(session.clone());

    let ready = ServerMessage::Ready {
        version: env!("CARGO_PKG_VERSION").to_string(),
        shell_integration,
    };
    if let Err(e) = send(&mut write_half, &ready).await {
        warn!(error = %e, "Failed to acknowledge hello");
    } else {
        serve(&session, &mut lines, &mut overlays, &mut write_half).await;
    }

    session.close();
    slot.lock().take();
    info!("Connection handler finished");
}

async fn serve(
    session: &Session,
    lines: &mut tokio::io::Lines<BufReader<tokio::net::unix::OwnedReadHalf>>,
    overlays: &mut mpsc::Receiver<companion_core::OverlayCommand>,
    write_half: &mut OwnedWriteHalf,
) {
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match decode_line(&line) {
                    Ok(message) => {
                        debug!(?message, "Received message");
                        session.apply(message).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "Ignoring malformed message");
                        if send(write_half, &ServerMessage::error(&e)).await.is_err() {
                            break;
                        }
                    }
                },
                Ok(None) => {
                    info!("Editor disconnected (EOF)");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Read error");
                    break;
                }
            },
            command = overlays.recv() => match command {
                Some(command) => {
                    if let Err(e) = send(write_half, &ServerMessage::Overlay { command }).await {
                        error!(error = %e, "Failed to forward overlay");
                        break;
                    }
                }
                None => {
                    info!("Overlay channel closed");
                    break;
                }
            },
        }
    }
}
