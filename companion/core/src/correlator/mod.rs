//! Event Correlator - The Mood State Machine
//!
//! The correlator consumes the editor's independent event streams and decides
//! when exactly one mood transition fires. It owns:
//! - the current mood (the mood of whatever overlay is showing, or `Idle`)
//! - the inactivity timer, which fires into the AFK mood
//! - the error debounce timer, which re-checks diagnostics before firing Error
//! - the last reported error line, so one unresolved error triggers once
//!
//! # Moods
//!
//! `Error` is sticky: ordinary typing and navigation leave its overlay up, and
//! only resolving the diagnostic or a mouse click clears it. Every other mood is
//! transient and cleared by the next activity event.
//!
//! # Concurrency
//!
//! Host events arrive on one ordered queue and are handled one at a time, in
//! the order the host published them, by a single dispatch task. The
//! handlers are synchronous; only the trigger pipeline suspends (asset
//! selection and display), and it runs on its own task. All state lives behind
//! one mutex that is never held across an await, so every cancel-then-rearm of
//! a timer is a single step.
//!
//! Each trigger takes a new generation number. Anything that changes what
//! should be on screen (a newer trigger, a dismissal, `dispose`) bumps the
//! generation, and a pipeline whose generation is no longer current discards
//! its asset instead of showing it. Pipelines take turns at the surface, and
//! one that finds itself outdated after `show` returns hides what it showed.

mod subscriptions;
mod timer;

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::assets::AssetSelector;
use crate::display::{DisplaySurface, OverlayDuration};
use crate::error::{LifecycleError, TriggerError, TriggerOutcome};
use crate::events::{first_error_line, HostEvent, SelectionKind, TEST_COMMAND};
use crate::host::EditorHost;
use crate::mood::Mood;
use crate::settings::{SettingsProvider, SETTINGS_NAMESPACE};

use subscriptions::Handler;
use timer::{Ticket, TimerSlot};

enum Lifecycle {
    /// Created, not yet subscribed
    Created,
    /// Subscribed; the dispatch task is running
    Monitoring { dispatch: AbortHandle },
    /// Torn down for good
    Disposed,
}

struct MoodState {
    current: Mood,
    last_error_line: Option<u32>,
    generation: u64,
    inactivity: TimerSlot,
    error_debounce: TimerSlot,
    lifecycle: Lifecycle,
}

impl MoodState {
    fn is_disposed(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Disposed)
    }
}

struct Shared {
    settings: Arc<dyn SettingsProvider>,
    assets: Arc<dyn AssetSelector>,
    surface: Arc<dyn DisplaySurface>,
    host: Arc<dyn EditorHost>,
    state: Mutex<MoodState>,
    /// Held across `DisplaySurface::show` and the checks around it
    display: tokio::sync::Mutex<()>,
}

/// Correlates editor events into mood transitions
///
/// Cheap to clone; clones share the same state. Create one per editing session,
/// call [`start_monitoring`](Self::start_monitoring) once and
/// [`dispose`](Self::dispose) when the session ends.
#[derive(Clone)]
pub struct EventCorrelator {
    shared: Arc<Shared>,
}

impl EventCorrelator {
    /// Create a correlator wired to its collaborators
    ///
    /// Nothing is subscribed and no timer is armed until `start_monitoring`.
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        assets: Arc<dyn AssetSelector>,
        surface: Arc<dyn DisplaySurface>,
        host: Arc<dyn EditorHost>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                assets,
                surface,
                host,
                state: Mutex::new(MoodState {
                    current: Mood::Idle,
                    last_error_line: None,
                    generation: 0,
                    inactivity: TimerSlot::new("inactivity"),
                    error_debounce: TimerSlot::new("error_debounce"),
                    lifecycle: Lifecycle::Created,
                }),
                display: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn upgrade(shared: &Weak<Shared>) -> Option<Self> {
        shared.upgrade().map(|shared| Self { shared })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Subscribe to the host and arm the inactivity timer
    ///
    /// Idempotent: calling it again while monitoring does nothing. Fails once
    /// the correlator has been disposed, or when the host serves none of the
    /// event sources.
    pub fn start_monitoring(&self) -> Result<(), LifecycleError> {
        let delay = self.shared.settings.current().inactivity_delay();

        let mut state = self.shared.state.lock();
        match state.lifecycle {
            Lifecycle::Disposed => return Err(LifecycleError::Disposed),
            Lifecycle::Monitoring { .. } => {
                tracing::debug!("Already monitoring, ignoring start");
                return Ok(());
            }
            Lifecycle::Created => {}
        }

        let events = subscriptions::subscribe_all(self.shared.host.as_ref())
            .ok_or(LifecycleError::NoEventSources)?;
        let task = tokio::spawn(dispatch(Arc::downgrade(&self.shared), events));
        state.lifecycle = Lifecycle::Monitoring {
            dispatch: task.abort_handle(),
        };
        self.reschedule_inactivity(&mut state, delay);

        tracing::info!(afk_delay = ?delay, "Event correlator monitoring");
        Ok(())
    }

    /// Cancel both timers and unsubscribe from the host
    ///
    /// Safe to call more than once. The visible overlay is left to the surface.
    pub fn dispose(&self) {
        let mut state = self.shared.state.lock();
        match std::mem::replace(&mut state.lifecycle, Lifecycle::Disposed) {
            Lifecycle::Disposed => return,
            Lifecycle::Monitoring { dispatch } => dispatch.abort(),
            Lifecycle::Created => {}
        }

        state.inactivity.cancel();
        state.error_debounce.cancel();
        state.generation += 1;
        tracing::info!("Event correlator disposed");
    }

    /// Whether `start_monitoring` succeeded and `dispose` has not run
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        matches!(self.shared.state.lock().lifecycle, Lifecycle::Monitoring { .. })
    }

    // ========================================================================
    // State inspection
    // ========================================================================

    /// Mood of the overlay currently attributed to the correlator
    #[must_use]
    pub fn current_mood(&self) -> Mood {
        self.shared.state.lock().current
    }

    /// Line of the last error that was acted on, if it is still unresolved
    #[must_use]
    pub fn last_error_line(&self) -> Option<u32> {
        self.shared.state.lock().last_error_line
    }

    /// Whether the inactivity timer is armed
    #[must_use]
    pub fn inactivity_pending(&self) -> bool {
        self.shared.state.lock().inactivity.is_pending()
    }

    /// Whether an error debounce is in flight
    #[must_use]
    pub fn error_debounce_pending(&self) -> bool {
        self.shared.state.lock().error_debounce.is_pending()
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    /// Typing, navigation, or a non-mouse selection
    ///
    /// Re-arms the inactivity timer, then clears any transient overlay. An
    /// Error overlay stays up.
    pub fn on_activity(&self) {
        let delay = self.shared.settings.current().inactivity_delay();

        let mut state = self.shared.state.lock();
        if state.is_disposed() {
            return;
        }
        self.reschedule_inactivity(&mut state, delay);
        if state.current.is_sticky() {
            tracing::trace!(mood = %state.current, "Activity ignored by sticky mood");
            return;
        }
        self.dismiss(&mut state);
    }

    /// A mouse selection always dismisses, whatever the mood
    pub fn on_mouse_dismiss(&self) {
        let mut state = self.shared.state.lock();
        if state.is_disposed() {
            return;
        }
        tracing::debug!(mood = %state.current, "Overlay dismissed by mouse");
        self.dismiss(&mut state);
    }

    /// Diagnostics were recomputed
    ///
    /// Looks at the first error of the active document. A new error line arms
    /// the debounce; no error at all cancels the debounce and clears a showing
    /// Error overlay.
    pub fn on_diagnostics_changed(&self) {
        let Some(diagnostics) = self.shared.host.active_diagnostics() else {
            tracing::trace!("Diagnostics changed without an active document");
            return;
        };
        let settings = self.shared.settings.current();
        let line = if settings.error.enabled {
            first_error_line(&diagnostics)
        } else {
            None
        };

        let mut state = self.shared.state.lock();
        if state.is_disposed() {
            return;
        }

        match line {
            None => {
                state.error_debounce.cancel();
                if state.current == Mood::Error {
                    tracing::debug!("Error resolved, hiding overlay");
                    self.dismiss(&mut state);
                }
                state.last_error_line = None;
            }
            Some(line) if state.last_error_line == Some(line) => {}
            Some(line) => {
                if state.error_debounce.is_pending() {
                    return;
                }
                let weak = Arc::downgrade(&self.shared);
                state
                    .error_debounce
                    .arm(settings.error.debounce, move |ticket| async move {
                        if let Some(correlator) = Self::upgrade(&weak) {
                            correlator.on_debounce_elapsed(ticket).await;
                        }
                    });
                tracing::debug!(line, debounce = ?settings.error.debounce, "New error, debouncing");
            }
        }
    }

    /// An external process (task, debug session, shell command) completed
    ///
    /// Triggers Success for exit code 0 when Success is enabled, returning the
    /// spawned pipeline.
    pub fn on_external_success(&self, exit_code: Option<i32>) -> Option<JoinHandle<TriggerOutcome>> {
        if exit_code != Some(0) {
            tracing::trace!(?exit_code, "Process did not succeed");
            return None;
        }
        if !self.shared.settings.current().success.enabled {
            return None;
        }
        Some(self.spawn_trigger(Mood::Success))
    }

    /// Settings changed under `namespace`
    ///
    /// Only our own namespace matters; it re-arms the inactivity timer with the
    /// new delay and enable flag.
    pub fn on_config_changed(&self, namespace: &str) {
        if namespace != SETTINGS_NAMESPACE {
            return;
        }
        let delay = self.shared.settings.current().inactivity_delay();

        let mut state = self.shared.state.lock();
        if state.is_disposed() {
            return;
        }
        self.reschedule_inactivity(&mut state, delay);
        tracing::debug!(afk_delay = ?delay, "Settings changed, inactivity timer rescheduled");
    }

    // ========================================================================
    // Trigger pipeline
    // ========================================================================

    /// Run the trigger pipeline for `mood` to completion
    pub async fn trigger_mood(&self, mood: Mood) -> TriggerOutcome {
        let begun = {
            let mut state = self.shared.state.lock();
            Self::begin_trigger(&mut state, mood)
        };
        match begun {
            Some(generation) => self.run_pipeline(mood, generation).await,
            None => TriggerOutcome::Inactive,
        }
    }

    /// Start the trigger pipeline for `mood` on its own task
    ///
    /// The mood is set before this returns; selection and display happen on
    /// the spawned task.
    pub fn spawn_trigger(&self, mood: Mood) -> JoinHandle<TriggerOutcome> {
        let begun = {
            let mut state = self.shared.state.lock();
            Self::begin_trigger(&mut state, mood)
        };
        let correlator = self.clone();
        tokio::spawn(async move {
            match begun {
                Some(generation) => correlator.run_pipeline(mood, generation).await,
                None => TriggerOutcome::Inactive,
            }
        })
    }

    /// First, synchronous half of the pipeline; `None` once disposed
    fn begin_trigger(state: &mut MoodState, mood: Mood) -> Option<u64> {
        if state.is_disposed() {
            return None;
        }
        state.current = mood;
        state.generation += 1;
        if mood != Mood::Error && state.error_debounce.cancel() {
            tracing::debug!(%mood, "Trigger superseded pending error debounce");
        }
        tracing::debug!(%mood, generation = state.generation, "Mood triggered");
        Some(state.generation)
    }

    async fn run_pipeline(&self, mood: Mood, generation: u64) -> TriggerOutcome {
        let path = match self.shared.assets.select(mood).await {
            Ok(Some(path)) => path,
            Ok(None) => return self.fail(mood, generation, TriggerError::AssetNotFound),
            Err(e) => return self.fail(mood, generation, e.into()),
        };

        // Held through the stale-hide below: only this pipeline's overlay may be hidden
        let _display = self.shared.display.lock().await;

        if !self.is_current(generation) {
            tracing::debug!(%mood, path = %path.display(), "Discarding stale asset");
            return TriggerOutcome::Superseded;
        }

        let duration = if mood == Mood::Afk {
            OverlayDuration::Persist
        } else {
            OverlayDuration::SurfaceDefault
        };
        if let Err(e) = self.shared.surface.show(&path, duration).await {
            return self.fail(mood, generation, e.into());
        }

        // A dismissal may have run while the surface was showing
        if !self.is_current(generation) {
            tracing::debug!(
                %mood,
                path = %path.display(),
                "Overlay outdated on arrival, hiding"
            );
            self.shared.surface.hide();
            return TriggerOutcome::Superseded;
        }

        tracing::info!(%mood, path = %path.display(), "Overlay shown");
        TriggerOutcome::Shown { path }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.shared.state.lock().generation == generation
    }

    /// Reset the mood (unless a newer trigger owns it) and report once
    fn fail(&self, mood: Mood, generation: u64, error: TriggerError) -> TriggerOutcome {
        {
            let mut state = self.shared.state.lock();
            if state.generation == generation {
                state.current = Mood::Idle;
            }
        }
        report(mood, &error);
        TriggerOutcome::Failed(error)
    }

    // ========================================================================
    // Timers
    // ========================================================================

    fn reschedule_inactivity(&self, state: &mut MoodState, delay: Option<Duration>) {
        let Some(delay) = delay else {
            state.inactivity.cancel();
            return;
        };
        let weak = Arc::downgrade(&self.shared);
        state.inactivity.arm(delay, move |ticket| async move {
            if let Some(correlator) = Self::upgrade(&weak) {
                correlator.on_inactivity_elapsed(ticket).await;
            }
        });
    }

    async fn on_inactivity_elapsed(&self, ticket: Ticket) {
        let generation = {
            let mut state = self.shared.state.lock();
            if !state.inactivity.claim(ticket) {
                return;
            }
            tracing::debug!("Inactivity timeout elapsed");
            Self::begin_trigger(&mut state, Mood::Afk)
        };
        if let Some(generation) = generation {
            self.run_pipeline(Mood::Afk, generation).await;
        }
    }

    async fn on_debounce_elapsed(&self, ticket: Ticket) {
        let error_enabled = self.shared.settings.current().error.enabled;
        let line = self
            .shared
            .host
            .active_diagnostics()
            .and_then(|diagnostics| first_error_line(&diagnostics))
            .filter(|_| error_enabled);

        let generation = {
            let mut state = self.shared.state.lock();
            if !state.error_debounce.claim(ticket) {
                return;
            }
            match line {
                Some(line) if state.last_error_line != Some(line) => {
                    state.last_error_line = Some(line);
                    tracing::debug!(line, "Error persisted past debounce");
                    Self::begin_trigger(&mut state, Mood::Error)
                }
                _ => {
                    tracing::debug!(?line, "Error debounce elapsed with nothing new");
                    None
                }
            }
        };
        if let Some(generation) = generation {
            self.run_pipeline(Mood::Error, generation).await;
        }
    }

    /// Hide the overlay and return to `Idle`, overtaking in-flight triggers
    fn dismiss(&self, state: &mut MoodState) {
        state.current = Mood::Idle;
        state.generation += 1;
        self.shared.surface.hide();
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn handle_event(&self, event: HostEvent) {
        let source = event.source();
        let Some(handler) = subscriptions::route(source) else {
            tracing::trace!(%source, "Unrouted event");
            return;
        };

        match (handler, event) {
            (Handler::Activity, _) => self.on_activity(),
            (
                Handler::Selection,
                HostEvent::SelectionChanged {
                    kind: SelectionKind::Mouse,
                },
            ) => self.on_mouse_dismiss(),
            (Handler::Selection, _) => self.on_activity(),
            (Handler::Diagnostics, _) => self.on_diagnostics_changed(),
            (Handler::ProcessCompletion, HostEvent::ProcessCompleted { kind, exit_code }) => {
                tracing::debug!(?kind, ?exit_code, "Process completed");
                self.on_external_success(exit_code);
            }
            (Handler::Configuration, HostEvent::ConfigurationChanged { namespace }) => {
                self.on_config_changed(&namespace);
            }
            (Handler::Command, HostEvent::CommandInvoked { command }) if command == TEST_COMMAND => {
                self.spawn_trigger(Mood::Test);
            }
            (handler, event) => {
                tracing::trace!(?handler, ?event, "Event ignored");
            }
        }
    }
}

/// Deliver host events to the correlator one at a time, in publish order
///
/// Holds only a weak reference so a dropped correlator ends the loop.
async fn dispatch(shared: Weak<Shared>, mut events: ReceiverStream<HostEvent>) {
    while let Some(event) = events.next().await {
        let Some(correlator) = EventCorrelator::upgrade(&shared) else {
            break;
        };
        correlator.handle_event(event);
    }
    tracing::debug!("Event dispatch finished");
}

/// Log a pipeline failure at the level its kind deserves
fn report(mood: Mood, error: &TriggerError) {
    match error {
        TriggerError::AssetNotFound if mood == Mood::Success => {
            tracing::debug!(%mood, "No asset for mood");
        }
        TriggerError::AssetNotFound => {
            tracing::warn!(%mood, "No asset found for mood");
        }
        TriggerError::AssetReadFailure(e) => {
            tracing::warn!(%mood, error = %e, "Asset selection failed");
        }
        TriggerError::NoActiveSurface => {
            tracing::debug!(%mood, "No active surface, skipping overlay");
        }
        TriggerError::DisplayFailed(e) => {
            tracing::error!(%mood, error = %e, "Failed to show overlay");
        }
    }
}

impl std::fmt::Debug for EventCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("EventCorrelator")
            .field("current", &state.current)
            .field("last_error_line", &state.last_error_line)
            .field("generation", &state.generation)
            .finish_non_exhaustive()
    }
}
