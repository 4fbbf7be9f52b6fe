//! Host Events
//!
//! Events delivered by the editor host to the correlator. Each event belongs to
//! exactly one [`EventSource`]; the correlator subscribes per source and routes
//! every source to one handler.
//!
//! # Design Philosophy
//!
//! The host is a "dumb" reporter: it says what happened (a document changed, a
//! task ended with exit code 1) and never decides what that means for the
//! companion's mood. Interpretation lives in the correlator.

use serde::{Deserialize, Serialize};

/// Command id that manually triggers the `Test` mood
pub const TEST_COMMAND: &str = "companion.triggerTest";

// ============================================
// Sources
// ============================================

/// A host event stream the correlator can subscribe to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Text edits in any document
    DocumentChanged,
    /// The focused editor changed
    ActiveEditorChanged,
    /// Cursor/selection moved (keyboard, mouse, or command)
    SelectionChanged,
    /// Diagnostics were recomputed for one or more documents
    DiagnosticsChanged,
    /// A task-runner process ended
    TaskEnded,
    /// A debug session ended
    DebugSessionEnded,
    /// An integrated-shell command ended (optional host capability)
    ShellExecutionEnded,
    /// Settings changed
    ConfigurationChanged,
    /// A command was invoked
    Command,
}

impl EventSource {
    /// Every source, in subscription order
    pub const ALL: [EventSource; 9] = [
        EventSource::DocumentChanged,
        EventSource::ActiveEditorChanged,
        EventSource::SelectionChanged,
        EventSource::DiagnosticsChanged,
        EventSource::TaskEnded,
        EventSource::DebugSessionEnded,
        EventSource::ShellExecutionEnded,
        EventSource::ConfigurationChanged,
        EventSource::Command,
    ];
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DocumentChanged => "document-changed",
            Self::ActiveEditorChanged => "active-editor-changed",
            Self::SelectionChanged => "selection-changed",
            Self::DiagnosticsChanged => "diagnostics-changed",
            Self::TaskEnded => "task-ended",
            Self::DebugSessionEnded => "debug-session-ended",
            Self::ShellExecutionEnded => "shell-execution-ended",
            Self::ConfigurationChanged => "configuration-changed",
            Self::Command => "command",
        };
        f.write_str(name)
    }
}

// ============================================
// Events
// ============================================

/// How a selection change was caused
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionKind {
    /// Keyboard navigation or typing
    #[default]
    Keyboard,
    /// A mouse click: always an intentional dismiss
    Mouse,
    /// Moved by an editor command
    Command,
}

/// Kind of external process that completed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    /// Task runner (build, test, lint tasks)
    Task,
    /// Debugger session
    Debug,
    /// Integrated shell command
    Shell,
}

impl ProcessKind {
    /// The event source that reports this process kind
    #[must_use]
    pub fn source(&self) -> EventSource {
        match self {
            Self::Task => EventSource::TaskEnded,
            Self::Debug => EventSource::DebugSessionEnded,
            Self::Shell => EventSource::ShellExecutionEnded,
        }
    }
}

/// An event from the editor host
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// A document's text changed
    DocumentChanged {
        /// Document uri
        uri: String,
    },
    /// The active editor changed (`None` when no editor is focused)
    ActiveEditorChanged {
        /// Uri of the newly active document
        uri: Option<String>,
    },
    /// The selection changed
    SelectionChanged {
        /// What caused the change
        kind: SelectionKind,
    },
    /// Diagnostics changed for the listed documents
    DiagnosticsChanged {
        /// Uris whose diagnostics changed
        uris: Vec<String>,
    },
    /// An external process completed
    ProcessCompleted {
        /// Which kind of process
        kind: ProcessKind,
        /// Exit status, if the host reported one
        exit_code: Option<i32>,
    },
    /// Settings changed under a namespace
    ConfigurationChanged {
        /// The namespace that changed
        namespace: String,
    },
    /// A command was invoked
    CommandInvoked {
        /// Command id
        command: String,
    },
}

impl HostEvent {
    /// The source this event is delivered on
    #[must_use]
    pub fn source(&self) -> EventSource {
        match self {
            Self::DocumentChanged { .. } => EventSource::DocumentChanged,
            Self::ActiveEditorChanged { .. } => EventSource::ActiveEditorChanged,
            Self::SelectionChanged { .. } => EventSource::SelectionChanged,
            Self::DiagnosticsChanged { .. } => EventSource::DiagnosticsChanged,
            Self::ProcessCompleted { kind, .. } => kind.source(),
            Self::ConfigurationChanged { .. } => EventSource::ConfigurationChanged,
            Self::CommandInvoked { .. } => EventSource::Command,
        }
    }
}

// ============================================
// Diagnostics
// ============================================

/// Diagnostic severity, most severe first
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Compile/lint error
    Error,
    /// Warning
    Warning,
    /// Informational
    Information,
    /// Hint
    Hint,
}

/// A single diagnostic in a document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Zero-based start line
    pub line: u32,
    /// Severity
    pub severity: Severity,
}

impl Diagnostic {
    /// Create a diagnostic
    #[must_use]
    pub fn new(line: u32, severity: Severity) -> Self {
        Self { line, severity }
    }

    /// Shorthand for an error diagnostic
    #[must_use]
    pub fn error(line: u32) -> Self {
        Self::new(line, Severity::Error)
    }
}

/// Line of the first error-severity diagnostic, in document order
#[must_use]
pub fn first_error_line(diagnostics: &[Diagnostic]) -> Option<u32> {
    diagnostics
        .iter()
        .find(|d| d.severity == Severity::Error)
        .map(|d| d.line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_error_line_uses_document_order() {
        let diagnostics = vec![
            Diagnostic::new(2, Severity::Warning),
            Diagnostic::error(9),
            Diagnostic::error(4),
        ];
        assert_eq!(first_error_line(&diagnostics), Some(9));
    }

    #[test]
    fn test_first_error_line_ignores_warnings() {
        let diagnostics = vec![
            Diagnostic::new(1, Severity::Warning),
            Diagnostic::new(3, Severity::Hint),
        ];
        assert_eq!(first_error_line(&diagnostics), None);
        assert_eq!(first_error_line(&[]), None);
    }

    #[test]
    fn test_process_events_map_to_their_source() {
        let event = HostEvent::ProcessCompleted {
            kind: ProcessKind::Shell,
            exit_code: Some(0),
        };
        assert_eq!(event.source(), EventSource::ShellExecutionEnded);
        assert_eq!(ProcessKind::Debug.source(), EventSource::DebugSessionEnded);
    }

    #[test]
    fn test_host_event_wire_format() {
        let event = HostEvent::SelectionChanged {
            kind: SelectionKind::Mouse,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"selection_changed","kind":"mouse"}"#);
    }
}
