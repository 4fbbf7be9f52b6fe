//! Trigger Errors and Outcomes
//!
//! The correlator is the failure boundary for every collaborator call. Nothing
//! here propagates to the host's event dispatch: failures are folded into a
//! [`TriggerOutcome`], the mood is reset, and the failure is logged once.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::assets::AssetError;
use crate::display::DisplayError;

/// Why a trigger did not produce an overlay
#[derive(Debug, Error)]
pub enum TriggerError {
    /// No asset matched the mood
    #[error("No asset found")]
    AssetNotFound,

    /// The asset selector failed; treated like `AssetNotFound` for state
    #[error("Asset selection failed: {0}")]
    AssetReadFailure(#[from] AssetError),

    /// There was nothing to display into
    #[error("No active surface")]
    NoActiveSurface,

    /// The display surface failed
    #[error("Display failed: {0}")]
    DisplayFailed(DisplayError),
}

impl From<DisplayError> for TriggerError {
    fn from(err: DisplayError) -> Self {
        match err {
            DisplayError::NoActiveSurface => Self::NoActiveSurface,
            other => Self::DisplayFailed(other),
        }
    }
}

impl TriggerError {
    /// Whether the failure belongs to the "no asset" family
    #[must_use]
    pub fn is_missing_asset(&self) -> bool {
        matches!(self, Self::AssetNotFound | Self::AssetReadFailure(_))
    }
}

/// Result of one pass through the trigger pipeline
#[derive(Debug)]
pub enum TriggerOutcome {
    /// The overlay was shown
    Shown {
        /// Asset that was displayed
        path: PathBuf,
    },
    /// The pipeline failed; the mood was reset to idle
    Failed(TriggerError),
    /// A newer trigger or dismissal overtook this one; its result was discarded
    Superseded,
    /// The correlator was disposed and ignored the trigger
    Inactive,
}

impl TriggerOutcome {
    /// Whether an overlay was shown
    #[must_use]
    pub fn is_shown(&self) -> bool {
        matches!(self, Self::Shown { .. })
    }

    /// The displayed asset, when one was shown
    #[must_use]
    pub fn shown_path(&self) -> Option<&Path> {
        match self {
            Self::Shown { path } => Some(path),
            _ => None,
        }
    }
}

/// Lifecycle misuse of the correlator
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// `start_monitoring` called after `dispose`
    #[error("Correlator has been disposed")]
    Disposed,

    /// The host serves none of the event sources the correlator listens to
    #[error("Host provides no event sources")]
    NoEventSources,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_active_surface_is_classified() {
        let err = TriggerError::from(DisplayError::NoActiveSurface);
        assert!(matches!(err, TriggerError::NoActiveSurface));

        let err = TriggerError::from(DisplayError::Closed);
        assert!(matches!(err, TriggerError::DisplayFailed(DisplayError::Closed)));
    }

    #[test]
    fn test_read_failure_counts_as_missing_asset() {
        let err = TriggerError::from(AssetError::FolderNotConfigured);
        assert!(err.is_missing_asset());
        assert!(TriggerError::AssetNotFound.is_missing_asset());
        assert!(!TriggerError::NoActiveSurface.is_missing_asset());
    }

    #[test]
    fn test_error_display() {
        let err = TriggerError::from(AssetError::FolderNotConfigured);
        assert_eq!(
            err.to_string(),
            "Asset selection failed: Asset folder is not configured"
        );
    }
}
