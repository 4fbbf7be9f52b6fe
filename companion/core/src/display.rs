//! Display Surface
//!
//! Shows an asset as an overlay on the editing surface and hides it again. The
//! correlator only sees the [`DisplaySurface`] trait.
//!
//! [`ChannelSurface`] does not render anything itself. It emits
//! [`OverlayCommand`]s to whatever renders them (an editor plugin, a test)
//! and owns the auto-dismiss timing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::settings::{OverlayPosition, SettingsProvider};

/// How long an overlay should stay up
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OverlayDuration {
    /// Use the surface's own configured duration
    #[default]
    SurfaceDefault,
    /// Keep the overlay until it is explicitly hidden
    Persist,
}

/// Errors raised by a display surface
#[derive(Debug, Error)]
pub enum DisplayError {
    /// There is no editor to display into
    #[error("No active surface to display into")]
    NoActiveSurface,

    /// The asset could not be read
    #[error("Asset {path} is not readable: {source}")]
    Unreadable {
        /// Asset path
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The renderer is not keeping up
    #[error("Overlay renderer is busy")]
    Busy,

    /// The renderer went away
    #[error("Overlay renderer disconnected")]
    Closed,
}

/// Shows and hides overlays
#[async_trait]
pub trait DisplaySurface: Send + Sync {
    /// Show `path` as the overlay, replacing whatever is shown
    async fn show(&self, path: &Path, duration: OverlayDuration) -> Result<(), DisplayError>;

    /// Hide the current overlay; a no-op when nothing is shown
    fn hide(&self);
}

/// Identifier of one shown overlay
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverlayId(pub u64);

impl std::fmt::Display for OverlayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "overlay_{}", self.0)
    }
}

/// Instructions for the overlay renderer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OverlayCommand {
    /// Render an overlay
    Show {
        /// Overlay id, echoed by the matching `Hide`
        id: OverlayId,
        /// Asset to render
        path: PathBuf,
        /// Maximum width in pixels
        max_width: u32,
        /// Maximum height in pixels
        max_height: u32,
        /// Anchor position
        position: OverlayPosition,
        /// Scheduled lifetime in milliseconds (`None` until hidden)
        duration_ms: Option<u64>,
    },
    /// Remove an overlay
    Hide {
        /// Overlay to remove
        id: OverlayId,
    },
}

struct SurfaceState {
    attached: bool,
    next_id: u64,
    shown: Option<OverlayId>,
    close_timer: Option<AbortHandle>,
}

struct SurfaceInner {
    tx: mpsc::Sender<OverlayCommand>,
    settings: Arc<dyn SettingsProvider>,
    state: Mutex<SurfaceState>,
}

/// Display surface that forwards overlay commands over a channel
#[derive(Clone)]
pub struct ChannelSurface {
    inner: Arc<SurfaceInner>,
}

impl ChannelSurface {
    /// Create a surface and the receiver its renderer reads from
    #[must_use]
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<OverlayCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let surface = Self {
            inner: Arc::new(SurfaceInner {
                tx,
                settings,
                state: Mutex::new(SurfaceState {
                    attached: true,
                    next_id: 0,
                    shown: None,
                    close_timer: None,
                }),
            }),
        };
        (surface, rx)
    }

    /// Mark whether an editor is available to display into
    ///
    /// Detaching hides the current overlay.
    pub fn set_attached(&self, attached: bool) {
        self.inner.state.lock().attached = attached;
        if !attached {
            self.hide();
        }
    }

    /// Currently shown overlay, if any
    #[must_use]
    pub fn current(&self) -> Option<OverlayId> {
        self.inner.state.lock().shown
    }

    /// Hide `id` if it is still the shown overlay
    fn expire(&self, id: OverlayId) {
        let mut state = self.inner.state.lock();
        if state.shown != Some(id) {
            return;
        }
        state.shown = None;
        state.close_timer = None;
        tracing::debug!(%id, "Overlay expired");
        self.send(OverlayCommand::Hide { id });
    }

    fn send(&self, command: OverlayCommand) -> bool {
        match self.inner.tx.try_send(command) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to deliver overlay command");
                false
            }
        }
    }
}

#[async_trait]
impl DisplaySurface for ChannelSurface {
    async fn show(&self, path: &Path, duration: OverlayDuration) -> Result<(), DisplayError> {
        if !self.inner.state.lock().attached {
            return Err(DisplayError::NoActiveSurface);
        }
        if self.inner.tx.is_closed() {
            return Err(DisplayError::Closed);
        }

        tokio::fs::metadata(path)
            .await
            .map_err(|source| DisplayError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;

        let display = self.inner.settings.current().display;
        let lifetime = match duration {
            OverlayDuration::Persist => None,
            OverlayDuration::SurfaceDefault => {
                (!display.duration.is_zero()).then_some(display.duration)
            }
        };

        let mut state = self.inner.state.lock();
        if !state.attached {
            return Err(DisplayError::NoActiveSurface);
        }
        if let Some(timer) = state.close_timer.take() {
            timer.abort();
        }
        if let Some(previous) = state.shown.take() {
            self.send(OverlayCommand::Hide { id: previous });
        }

        state.next_id += 1;
        let id = OverlayId(state.next_id);
        let command = OverlayCommand::Show {
            id,
            path: path.to_path_buf(),
            max_width: display.max_width,
            max_height: display.max_height,
            position: display.position,
            duration_ms: lifetime.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        };
        match self.inner.tx.try_send(command) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => return Err(DisplayError::Busy),
            Err(mpsc::error::TrySendError::Closed(_)) => return Err(DisplayError::Closed),
        }
        state.shown = Some(id);

        if let Some(lifetime) = lifetime {
            let surface = self.clone();
            let timer = tokio::spawn(async move {
                tokio::time::sleep(lifetime).await;
                surface.expire(id);
            });
            state.close_timer = Some(timer.abort_handle());
        }

        tracing::debug!(%id, path = %path.display(), ?lifetime, "Overlay shown");
        Ok(())
    }

    fn hide(&self) {
        let mut state = self.inner.state.lock();
        if let Some(timer) = state.close_timer.take() {
            timer.abort();
        }
        if let Some(id) = state.shown.take() {
            tracing::debug!(%id, "Overlay hidden");
            self.send(OverlayCommand::Hide { id });
        }
    }
}
