//! Companion Settings
//!
//! Typed settings for the companion, loaded from a TOML file at
//! `~/.config/companion/settings.toml` and overridden by environment variables.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. Environment variables (`COMPANION_*`)
//! 2. TOML settings file
//! 3. Default values
//!
//! # Lookups Are Never Cached
//!
//! The correlator asks its [`SettingsProvider`] for fresh values on every
//! handler invocation, so a reload is visible to the very next event. The
//! `ConfigurationChanged` event only exists so the inactivity timer can be
//! rescheduled with the new delay.
//!
//! # Example Settings File
//!
//! ```toml
//! [afk]
//! enabled = true
//! delay_ms = 300000
//!
//! [error]
//! enabled = true
//! debounce_ms = 3000
//!
//! [success]
//! enabled = true
//!
//! [assets]
//! folder = "/home/me/gifs"
//! active_series = ["k-on"]
//! extensions = ["gif"]
//!
//! [assets.tags]
//! afk = ["sleep"]
//! error = ["panic", "facepalm"]
//! success = ["dance"]
//! test = ["wave"]
//!
//! [display]
//! max_width = 300
//! max_height = 300
//! duration_ms = 5000
//! position = "top_right"
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mood::Mood;

/// Namespace reported by `ConfigurationChanged` events for these settings
pub const SETTINGS_NAMESPACE: &str = "companion";

/// Default inactivity delay before the AFK mood (5 minutes)
pub const DEFAULT_AFK_DELAY: Duration = Duration::from_secs(5 * 60);

/// Default error debounce window
pub const DEFAULT_ERROR_DEBOUNCE: Duration = Duration::from_millis(3000);

/// Default overlay display duration
pub const DEFAULT_DISPLAY_DURATION: Duration = Duration::from_secs(5);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading settings
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the settings file
    #[error("Failed to read settings file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML settings: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid settings value
    #[error("Invalid settings: {0}")]
    ValidationError(String),

    /// The background reload task did not complete
    #[error("Settings reload aborted: {0}")]
    ReloadAborted(String),
}

/// Tracks where the effective settings came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingsSource {
    /// At least one value came from an environment variable
    Env,
    /// Values came from the TOML settings file
    File,
    /// Nothing overridden
    Default,
}

impl std::fmt::Display for SettingsSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "settings file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Typed Settings
// =============================================================================

/// Where the overlay is anchored on the editing surface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPosition {
    /// Top-left corner
    TopLeft,
    /// Top-right corner
    #[default]
    TopRight,
    /// Bottom-left corner
    BottomLeft,
    /// Bottom-right corner
    BottomRight,
}

/// Inactivity (AFK) settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AfkSettings {
    /// Whether the AFK mood may trigger
    pub enabled: bool,
    /// Inactivity delay; zero disables the timer
    pub delay: Duration,
}

/// Error diagnostics settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorSettings {
    /// Whether the Error mood may trigger
    pub enabled: bool,
    /// How long a new error must persist before it triggers
    pub debounce: Duration,
}

/// Process-success settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuccessSettings {
    /// Whether the Success mood may trigger
    pub enabled: bool,
}

/// Tag lists per mood; a file matches a tag when named `<tag>_*.<ext>`
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MoodTags {
    /// Tags for the AFK mood
    pub afk: Vec<String>,
    /// Tags for the Error mood
    pub error: Vec<String>,
    /// Tags for the Success mood
    pub success: Vec<String>,
    /// Tags for the Test mood
    pub test: Vec<String>,
}

impl MoodTags {
    /// Tags configured for a mood (`Idle` has none)
    #[must_use]
    pub fn for_mood(&self, mood: Mood) -> &[String] {
        match mood {
            Mood::Idle => &[],
            Mood::Afk => &self.afk,
            Mood::Error => &self.error,
            Mood::Success => &self.success,
            Mood::Test => &self.test,
        }
    }
}

/// Asset library settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetSettings {
    /// Root asset folder
    pub folder: Option<PathBuf>,
    /// Series sub-folders scanned recursively
    pub active_series: Vec<String>,
    /// Accepted file extensions, without the dot
    pub extensions: Vec<String>,
    /// Tags per mood
    pub tags: MoodTags,
}

impl Default for AssetSettings {
    fn default() -> Self {
        Self {
            folder: None,
            active_series: Vec::new(),
            extensions: vec!["gif".to_string()],
            tags: MoodTags::default(),
        }
    }
}

/// Overlay display settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplaySettings {
    /// Maximum overlay width in pixels
    pub max_width: u32,
    /// Maximum overlay height in pixels
    pub max_height: u32,
    /// Default display duration; zero keeps overlays until hidden
    pub duration: Duration,
    /// Anchor position
    pub position: OverlayPosition,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            max_width: 300,
            max_height: 300,
            duration: DEFAULT_DISPLAY_DURATION,
            position: OverlayPosition::default(),
        }
    }
}

/// The full, typed settings snapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Inactivity settings
    pub afk: AfkSettings,
    /// Error diagnostics settings
    pub error: ErrorSettings,
    /// Process-success settings
    pub success: SuccessSettings,
    /// Asset library settings
    pub assets: AssetSettings,
    /// Overlay display settings
    pub display: DisplaySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            afk: AfkSettings {
                enabled: true,
                delay: DEFAULT_AFK_DELAY,
            },
            error: ErrorSettings {
                enabled: true,
                debounce: DEFAULT_ERROR_DEBOUNCE,
            },
            success: SuccessSettings { enabled: true },
            assets: AssetSettings::default(),
            display: DisplaySettings::default(),
        }
    }
}

impl Settings {
    /// Effective inactivity delay, or `None` when the AFK timer must stay unscheduled
    #[must_use]
    pub fn inactivity_delay(&self) -> Option<Duration> {
        (self.afk.enabled && !self.afk.delay.is_zero()).then_some(self.afk.delay)
    }

    /// Whether a mood is enabled. `Test` is always enabled, `Idle` never is.
    #[must_use]
    pub fn is_enabled(&self, mood: Mood) -> bool {
        match mood {
            Mood::Idle => false,
            Mood::Afk => self.afk.enabled,
            Mood::Error => self.error.enabled,
            Mood::Success => self.success.enabled,
            Mood::Test => true,
        }
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if self.display.max_width == 0 || self.display.max_height == 0 {
            return Err(SettingsError::ValidationError(
                "display.max_width and display.max_height must be positive".to_string(),
            ));
        }
        if self.assets.extensions.iter().any(|e| e.trim().is_empty()) {
            return Err(SettingsError::ValidationError(
                "assets.extensions must not contain empty entries".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Provider Seam
// =============================================================================

/// Source of typed settings lookups
///
/// Implementations must return current values on every call; the correlator
/// never caches what it reads.
pub trait SettingsProvider: Send + Sync {
    /// Snapshot of the current settings
    fn current(&self) -> Settings;
}

impl SettingsProvider for Settings {
    fn current(&self) -> Settings {
        self.clone()
    }
}

/// Settings shared between the daemon and the correlator, reloadable in place
#[derive(Clone, Debug)]
pub struct SharedSettings {
    inner: Arc<RwLock<Settings>>,
    path: Option<PathBuf>,
}

impl SharedSettings {
    /// Wrap a fixed settings value (no backing file)
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
            path: None,
        }
    }

    /// Load from a settings file (or defaults/env when `path` is `None`)
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<PathBuf>) -> Result<Self, SettingsError> {
        let loaded = load_settings_from_path(path.clone())?;
        Ok(Self {
            inner: Arc::new(RwLock::new(loaded.settings)),
            path,
        })
    }

    /// Path of the backing settings file, if any
    #[must_use]
    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    /// Replace the current settings
    pub fn replace(&self, settings: Settings) {
        *self.inner.write() = settings;
    }

    /// Re-read the backing file; returns whether anything changed
    ///
    /// On error the previous settings stay in effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn reload(&self) -> Result<bool, SettingsError> {
        let loaded = load_settings_from_path(self.path.clone())?;
        let mut current = self.inner.write();
        if *current == loaded.settings {
            return Ok(false);
        }
        *current = loaded.settings;
        tracing::info!(source = %loaded.source, "Settings reloaded");
        Ok(true)
    }

    /// [`reload`](Self::reload) on the blocking pool, for callers on the runtime
    ///
    /// # Errors
    ///
    /// Same as `reload`, plus `ReloadAborted` if the reload task panicked or
    /// was cancelled.
    pub async fn reload_async(&self) -> Result<bool, SettingsError> {
        let shared = self.clone();
        tokio::task::spawn_blocking(move || shared.reload())
            .await
            .map_err(|e| SettingsError::ReloadAborted(e.to_string()))?
    }
}

impl SettingsProvider for SharedSettings {
    fn current(&self) -> Settings {
        self.inner.read().clone()
    }
}

// =============================================================================
// TOML Structures
// =============================================================================

/// `[afk]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AfkToml {
    /// Whether AFK is enabled
    pub enabled: Option<bool>,
    /// Inactivity delay in milliseconds (0 disables)
    pub delay_ms: Option<u64>,
}

/// `[error]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorToml {
    /// Whether Error is enabled
    pub enabled: Option<bool>,
    /// Debounce window in milliseconds
    pub debounce_ms: Option<u64>,
}

/// `[success]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuccessToml {
    /// Whether Success is enabled
    pub enabled: Option<bool>,
}

/// `[assets]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsToml {
    /// Root asset folder
    pub folder: Option<PathBuf>,
    /// Active series sub-folders
    pub active_series: Option<Vec<String>>,
    /// Accepted extensions
    pub extensions: Option<Vec<String>>,
    /// Tags per mood
    pub tags: Option<MoodTags>,
}

/// `[display]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayToml {
    /// Maximum width in pixels
    pub max_width: Option<u32>,
    /// Maximum height in pixels
    pub max_height: Option<u32>,
    /// Default duration in milliseconds
    pub duration_ms: Option<u64>,
    /// Anchor position
    pub position: Option<OverlayPosition>,
}

/// Top-level TOML settings file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsToml {
    /// `[afk]`
    pub afk: AfkToml,
    /// `[error]`
    pub error: ErrorToml,
    /// `[success]`
    pub success: SuccessToml,
    /// `[assets]`
    pub assets: AssetsToml,
    /// `[display]`
    pub display: DisplayToml,
}

// =============================================================================
// Loading
// =============================================================================

/// Settings together with where they were loaded from
#[derive(Clone, Debug)]
pub struct LoadedSettings {
    /// The effective settings
    pub settings: Settings,
    /// Settings file that was read, if any
    pub path: Option<PathBuf>,
    /// Highest-priority layer that contributed a value
    pub source: SettingsSource,
}

/// Default settings file path
///
/// Returns `$XDG_CONFIG_HOME/companion/settings.toml` or
/// `~/.config/companion/settings.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("companion").join("settings.toml"))
}

/// Load settings from the default path
///
/// # Errors
///
/// Returns an error if the settings file exists but cannot be parsed.
/// A missing file is not an error (defaults are used).
pub fn load_settings() -> Result<LoadedSettings, SettingsError> {
    load_settings_from_path(default_settings_path())
}

/// Load settings from a specific path, then apply environment overrides
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or validated.
pub fn load_settings_from_path(path: Option<PathBuf>) -> Result<LoadedSettings, SettingsError> {
    load_with_env(path, |key| std::env::var(key).ok())
}

fn load_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<LoadedSettings, SettingsError> {
    let mut settings = Settings::default();
    let mut source = SettingsSource::Default;
    let mut loaded_path = None;

    if let Some(ref settings_path) = path {
        if settings_path.exists() {
            let content =
                std::fs::read_to_string(settings_path).map_err(|e| SettingsError::ReadError {
                    path: settings_path.clone(),
                    source: e,
                })?;

            let toml_settings: SettingsToml = toml::from_str(&content)?;
            apply_toml_settings(&mut settings, toml_settings);
            loaded_path = Some(settings_path.clone());
            source = SettingsSource::File;

            tracing::info!(path = %settings_path.display(), "Loaded settings from file");
        } else {
            tracing::debug!(
                path = %settings_path.display(),
                "Settings file not found, using defaults"
            );
        }
    }

    if apply_env_settings(&mut settings, env) {
        source = SettingsSource::Env;
    }

    settings.validate()?;

    Ok(LoadedSettings {
        settings,
        path: loaded_path,
        source,
    })
}

fn apply_toml_settings(settings: &mut Settings, toml: SettingsToml) {
    if let Some(enabled) = toml.afk.enabled {
        settings.afk.enabled = enabled;
    }
    if let Some(ms) = toml.afk.delay_ms {
        settings.afk.delay = Duration::from_millis(ms);
    }

    if let Some(enabled) = toml.error.enabled {
        settings.error.enabled = enabled;
    }
    if let Some(ms) = toml.error.debounce_ms {
        settings.error.debounce = Duration::from_millis(ms);
    }

    if let Some(enabled) = toml.success.enabled {
        settings.success.enabled = enabled;
    }

    if toml.assets.folder.is_some() {
        settings.assets.folder = toml.assets.folder;
    }
    if let Some(series) = toml.assets.active_series {
        settings.assets.active_series = series;
    }
    if let Some(extensions) = toml.assets.extensions {
        settings.assets.extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_string())
            .collect();
    }
    if let Some(tags) = toml.assets.tags {
        settings.assets.tags = tags;
    }

    if let Some(width) = toml.display.max_width {
        settings.display.max_width = width;
    }
    if let Some(height) = toml.display.max_height {
        settings.display.max_height = height;
    }
    if let Some(ms) = toml.display.duration_ms {
        settings.display.duration = Duration::from_millis(ms);
    }
    if let Some(position) = toml.display.position {
        settings.display.position = position;
    }
}

/// Apply `COMPANION_*` overrides; returns whether any were applied
fn apply_env_settings(settings: &mut Settings, env: impl Fn(&str) -> Option<String>) -> bool {
    let mut applied = false;

    if let Some(enabled) = env("COMPANION_AFK_ENABLED") {
        settings.afk.enabled = parse_flag(&enabled);
        applied = true;
    }
    if let Some(ms) = env("COMPANION_AFK_DELAY_MS").and_then(|v| v.parse::<u64>().ok()) {
        settings.afk.delay = Duration::from_millis(ms);
        applied = true;
    }
    if let Some(enabled) = env("COMPANION_ERROR_ENABLED") {
        settings.error.enabled = parse_flag(&enabled);
        applied = true;
    }
    if let Some(ms) = env("COMPANION_ERROR_DEBOUNCE_MS").and_then(|v| v.parse::<u64>().ok()) {
        settings.error.debounce = Duration::from_millis(ms);
        applied = true;
    }
    if let Some(enabled) = env("COMPANION_SUCCESS_ENABLED") {
        settings.success.enabled = parse_flag(&enabled);
        applied = true;
    }
    if let Some(folder) = env("COMPANION_ASSET_DIR") {
        settings.assets.folder = Some(PathBuf::from(folder));
        applied = true;
    }
    if let Some(ms) = env("COMPANION_DISPLAY_DURATION_MS").and_then(|v| v.parse::<u64>().ok()) {
        settings.display.duration = Duration::from_millis(ms);
        applied = true;
    }

    applied
}

fn parse_flag(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}
