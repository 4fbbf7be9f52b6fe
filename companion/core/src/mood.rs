//! Moods
//!
//! A mood is the semantic category behind an overlay: the reason the companion
//! is showing something. `Idle` is the resting state meaning "no overlay is
//! attributable to a mood right now".

use serde::{Deserialize, Serialize};

/// The companion's current mood
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    /// Nothing shown
    #[default]
    Idle,
    /// The developer has been inactive for the configured delay
    Afk,
    /// An unresolved error diagnostic appeared in the active document
    Error,
    /// A task, debug session, or shell command finished with exit code 0
    Success,
    /// Manually triggered from the test command
    Test,
}

impl Mood {
    /// Every mood that can be triggered (all but `Idle`)
    pub const TRIGGERABLE: [Mood; 4] = [Mood::Afk, Mood::Error, Mood::Success, Mood::Test];

    /// Whether an overlay for this mood survives ordinary activity
    ///
    /// Only `Error` is sticky. It clears when diagnostics resolve or on an
    /// explicit dismiss.
    #[must_use]
    pub fn is_sticky(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Settings key holding the tag list for this mood
    #[must_use]
    pub fn settings_key(&self) -> &'static str {
        match self {
            Self::Idle => "tags.idle",
            Self::Afk => "tags.afk",
            Self::Error => "tags.error",
            Self::Success => "tags.success",
            Self::Test => "tags.test",
        }
    }

    /// Lowercase label
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Afk => "afk",
            Self::Error => "error",
            Self::Success => "success",
            Self::Test => "test",
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
