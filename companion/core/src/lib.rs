//! Companion Core - Headless Mood Correlation for the Editor Companion
//!
//! This crate decides when the editor companion reacts. It watches what the
//! editor reports (edits, focus and selection changes, diagnostics, finished
//! tasks and debug sessions, settings changes), turns that into mood
//! transitions, and drives an asset selector and a display surface to put the
//! matching overlay on screen.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Editor (plugin / IPC)                    │
//! └──────────────┬───────────────────────────────▲───────────────┘
//!                │ HostEvent (up)                │ OverlayCommand (down)
//! ┌──────────────┼───────────────────────────────┼───────────────┐
//! │              ▼          COMPANION CORE       │                │
//! │     ┌────────────────┐               ┌───────┴────────┐      │
//! │     │  EditorHost    │               │ DisplaySurface │      │
//! │     └───────┬────────┘               └───────▲────────┘      │
//! │             │                                │               │
//! │     ┌───────▼────────────────────────────────┴────────┐      │
//! │     │                EventCorrelator                   │      │
//! │     │  mood · inactivity timer · error debounce        │      │
//! │     └───────┬───────────────────────────────┬─────────┘      │
//! │             │                               │                │
//! │     ┌───────▼────────┐              ┌───────▼────────┐       │
//! │     │ AssetSelector  │              │ SettingsProvider│      │
//! │     └────────────────┘              └────────────────┘       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`EventCorrelator`]: the mood state machine
//! - [`Mood`]: what the overlay is about
//! - [`HostEvent`]: events from the editor
//! - [`OverlayCommand`]: instructions for whatever renders overlays
//! - [`Settings`]: user configuration
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use companion_core::{
//!     ChannelHost, ChannelSurface, EventCorrelator, LocalAssetSelector, SharedSettings,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let settings = Arc::new(SharedSettings::load(None).unwrap());
//!     let host = Arc::new(ChannelHost::new());
//!     let (surface, mut overlays) = ChannelSurface::new(settings.clone(), 32);
//!
//!     let correlator = EventCorrelator::new(
//!         settings.clone(),
//!         Arc::new(LocalAssetSelector::new(settings)),
//!         Arc::new(surface),
//!         host.clone(),
//!     );
//!     correlator.start_monitoring().unwrap();
//!
//!     // Feed editor events into `host`, render whatever arrives on `overlays`
//!     while let Some(command) = overlays.recv().await {
//!         // ...
//!     }
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`mood`]: the mood enumeration
//! - [`events`]: editor event sources and payloads
//! - [`host`]: the editor host seam and its channel implementation
//! - [`settings`]: settings model, TOML loading and env overrides
//! - [`assets`]: picking an asset for a mood
//! - [`display`]: showing and hiding overlays
//! - [`correlator`]: the event correlator
//! - [`error`]: trigger errors and outcomes

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assets;
pub mod correlator;
pub mod display;
pub mod error;
pub mod events;
pub mod host;
pub mod mood;
pub mod settings;

// Re-exports for convenience
pub use assets::{AssetError, AssetSelector, LocalAssetSelector};
pub use correlator::EventCorrelator;
pub use display::{
    ChannelSurface, DisplayError, DisplaySurface, OverlayCommand, OverlayDuration, OverlayId,
};
pub use error::{LifecycleError, TriggerError, TriggerOutcome};
pub use events::{
    Diagnostic, EventSource, HostEvent, ProcessKind, SelectionKind, Severity, TEST_COMMAND,
};
pub use host::{ChannelHost, EditorHost};
pub use mood::Mood;
pub use settings::{
    load_settings, load_settings_from_path, LoadedSettings, OverlayPosition, Settings,
    SettingsError, SettingsProvider, SettingsSource, SharedSettings, SETTINGS_NAMESPACE,
};
