//! Wire Protocol
//!
//! Newline-delimited JSON in both directions. The editor plugin sends
//! [`ClientMessage`]s, starting with `hello`; the daemon answers with
//! [`ServerMessage`]s, mostly overlay commands for the plugin to render.
//!
//! ```text
//! → {"type":"hello","shell_integration":true}
//! ← {"type":"ready","version":"0.1.0","shell_integration":true}
//! → {"type":"diagnostics","uri":"file:///a.rs","diagnostics":[{"line":4,"severity":"error"}]}
//! ← {"type":"overlay","command":{"type":"show","id":1,...}}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use companion_core::{Diagnostic, OverlayCommand, SelectionKind};

/// Protocol errors on a single connection
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The line was not a valid client message
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The first message was not `hello`
    #[error("Expected hello as the first message")]
    HandshakeRequired,

    /// Another editor session is already connected
    #[error("Another session is already active")]
    SessionBusy,
}

/// Messages from the editor plugin
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens a session; declares optional host capabilities
    Hello {
        /// Whether the editor reports shell command completion
        #[serde(default)]
        shell_integration: bool,
    },
    /// A document was edited
    DocumentChanged {
        /// Document uri
        uri: String,
    },
    /// Focus moved to another editor, or to none
    ActiveEditorChanged {
        /// Newly active document
        #[serde(default)]
        uri: Option<String>,
    },
    /// The selection moved
    SelectionChanged {
        /// What moved it
        #[serde(default)]
        kind: SelectionKind,
    },
    /// Fresh diagnostics for one document
    Diagnostics {
        /// Document uri
        uri: String,
        /// Diagnostics in document order
        #[serde(default)]
        diagnostics: Vec<Diagnostic>,
    },
    /// A task finished
    TaskEnded {
        /// Exit status, if known
        #[serde(default)]
        exit_code: Option<i32>,
    },
    /// A debug session finished
    DebugSessionEnded {
        /// Exit status, if known
        #[serde(default)]
        exit_code: Option<i32>,
    },
    /// A shell command finished
    ShellExecutionEnded {
        /// Exit status, if known
        #[serde(default)]
        exit_code: Option<i32>,
    },
    /// Editor settings changed
    ConfigurationChanged {
        /// Affected settings namespace
        namespace: String,
    },
    /// A command was invoked
    Command {
        /// Command id
        command: String,
    },
}

/// Messages to the editor plugin
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session accepted
    Ready {
        /// Daemon version
        version: String,
        /// Echo of the declared shell integration
        shell_integration: bool,
    },
    /// Show or hide an overlay
    Overlay {
        /// The overlay instruction
        command: OverlayCommand,
    },
    /// Something went wrong with the last message or the connection
    Error {
        /// Human-readable reason
        message: String,
    },
}

impl ServerMessage {
    /// Error reply for a protocol error
    #[must_use]
    pub fn error(err: &ProtocolError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }
}

/// Decode one line
///
/// # Errors
///
/// Returns `Malformed` if the line is not a valid client message.
pub fn decode_line(line: &str) -> Result<ClientMessage, ProtocolError> {
    Ok(serde_json::from_str(line.trim())?)
}

/// Encode one message as a newline-terminated line
///
/// # Errors
///
/// Fails only if serialization fails.
pub fn encode_line(message: &ServerMessage) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_core::{OverlayId, Severity};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_hello_defaults() {
        assert_eq!(
            decode_line(r#"{"type":"hello"}"#).unwrap(),
            ClientMessage::Hello {
                shell_integration: false
            }
        );
    }

    #[test]
    fn test_decode_diagnostics() {
        let line = r#"{"type":"diagnostics","uri":"file:///a.rs","diagnostics":[{"line":4,"severity":"warning"},{"line":7,"severity":"error"}]}"#;
        assert_eq!(
            decode_line(line).unwrap(),
            ClientMessage::Diagnostics {
                uri: "file:///a.rs".to_string(),
                diagnostics: vec![
                    Diagnostic::new(4, Severity::Warning),
                    Diagnostic::new(7, Severity::Error),
                ],
            }
        );
    }

    #[test]
    fn test_decode_selection_and_process() {
        assert_eq!(
            decode_line(r#"{"type":"selection_changed","kind":"mouse"}"#).unwrap(),
            ClientMessage::SelectionChanged {
                kind: SelectionKind::Mouse
            }
        );
        assert_eq!(
            decode_line(r#"{"type":"task_ended","exit_code":0}"#).unwrap(),
            ClientMessage::TaskEnded { exit_code: Some(0) }
        );
        assert_eq!(
            decode_line(r#"{"type":"debug_session_ended"}"#).unwrap(),
            ClientMessage::DebugSessionEnded { exit_code: None }
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_line("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            decode_line(r#"{"type":"launch_rockets"}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_encode_overlay_line() {
        let line = encode_line(&ServerMessage::Overlay {
            command: OverlayCommand::Hide { id: OverlayId(2) },
        })
        .unwrap();
        assert_eq!(
            String::from_utf8(line).unwrap(),
            "{\"type\":\"overlay\",\"command\":{\"type\":\"hide\",\"id\":2}}\n"
        );
    }
}
