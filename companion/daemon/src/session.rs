//! Editor Session
//!
//! One connected editor: its in-process host, the overlay surface feeding the
//! connection, and the correlator watching both. Client messages are applied
//! here as host state changes and events.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use companion_core::{
    ChannelHost, ChannelSurface, DisplaySurface, EventCorrelator, EventSource, HostEvent, LifecycleError,
    LocalAssetSelector, OverlayCommand, ProcessKind, SettingsProvider, SharedSettings,
    SETTINGS_NAMESPACE,
};

use crate::protocol::ClientMessage;

/// Capacity of the overlay command channel towards the editor
pub const OVERLAY_CHANNEL_CAPACITY: usize = 64;

/// A live editor session
#[derive(Clone)]
pub struct Session {
    host: Arc<ChannelHost>,
    surface: ChannelSurface,
    correlator: EventCorrelator,
    settings: SharedSettings,
    shell_integration: bool,
}

impl Session {
    /// Wire up a session and start monitoring
    ///
    /// Without shell integration the shell-completion source is reported as
    /// unsupported, so the correlator never subscribes to it.
    pub fn start(
        settings: SharedSettings,
        shell_integration: bool,
    ) -> Result<(Self, mpsc::Receiver<OverlayCommand>), LifecycleError> {
        let mut host = ChannelHost::new();
        if !shell_integration {
            host = host.without(EventSource::ShellExecutionEnded);
        }
        let host = Arc::new(host);

        let provider: Arc<dyn SettingsProvider> = Arc::new(settings.clone());
        let (surface, overlays) = ChannelSurface::new(provider.clone(), OVERLAY_CHANNEL_CAPACITY);
        // Nothing to draw into until the editor reports a focused document
        surface.set_attached(false);

        let correlator = EventCorrelator::new(
            provider.clone(),
            Arc::new(LocalAssetSelector::new(provider)),
            Arc::new(surface.clone()),
            host.clone(),
        );
        correlator.start_monitoring()?;

        info!(shell_integration, "Session started");
        Ok((
            Self {
                host,
                surface,
                correlator,
                settings,
                shell_integration,
            },
            overlays,
        ))
    }

    /// Apply one client message
    ///
    /// Messages are applied in arrival order; a settings change is re-read
    /// before the correlator hears about it.
    pub async fn apply(&self, message: ClientMessage) {
        match message {
            ClientMessage::Hello { .. } => {
                warn!("Ignoring repeated hello");
            }
            ClientMessage::DocumentChanged { uri } => {
                self.host.publish(HostEvent::DocumentChanged { uri });
            }
            ClientMessage::ActiveEditorChanged { uri } => {
                self.surface.set_attached(uri.is_some());
                self.host.focus(uri);
            }
            ClientMessage::SelectionChanged { kind } => {
                self.host.publish(HostEvent::SelectionChanged { kind });
            }
            ClientMessage::Diagnostics { uri, diagnostics } => {
                self.host.report_diagnostics(uri, diagnostics);
            }
            ClientMessage::TaskEnded { exit_code } => {
                self.process_ended(ProcessKind::Task, exit_code);
            }
            ClientMessage::DebugSessionEnded { exit_code } => {
                self.process_ended(ProcessKind::Debug, exit_code);
            }
            ClientMessage::ShellExecutionEnded { exit_code } => {
                if !self.shell_integration {
                    warn!("Shell completion reported without declared shell integration");
                }
                self.process_ended(ProcessKind::Shell, exit_code);
            }
            ClientMessage::ConfigurationChanged { namespace } => {
                if namespace == SETTINGS_NAMESPACE {
                    self.reload_settings().await;
                }
                self.host
                    .publish(HostEvent::ConfigurationChanged { namespace });
            }
            ClientMessage::Command { command } => {
                self.host.publish(HostEvent::CommandInvoked { command });
            }
        }
    }

    fn process_ended(&self, kind: ProcessKind, exit_code: Option<i32>) {
        debug!(?kind, ?exit_code, "Process ended");
        self.host
            .publish(HostEvent::ProcessCompleted { kind, exit_code });
    }

    /// Re-read the settings file; the previous settings stay on failure
    async fn reload_settings(&self) {
        match self.settings.reload_async().await {
            Ok(changed) => debug!(changed, "Settings re-read"),
            Err(e) => warn!(error = %e, "Settings reload failed, keeping previous settings"),
        }
    }

    /// Tell the correlator its settings changed underneath it
    pub fn settings_reloaded(&self) {
        self.host.publish(HostEvent::ConfigurationChanged {
            namespace: SETTINGS_NAMESPACE.to_string(),
        });
    }

    /// The session's correlator
    #[must_use]
    pub fn correlator(&self) -> &EventCorrelator {
        &self.correlator
    }

    /// End the session: stop the correlator and clear the overlay
    pub fn close(&self) {
        self.correlator.dispose();
        self.surface.hide();
        info!("Session closed");
    }
}
