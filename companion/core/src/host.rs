//! Editor Host Seam
//!
//! The correlator never talks to an editor directly. It sees the editor through
//! [`EditorHost`]: one ordered event stream covering the sources it asked for,
//! a capability probe for optional sources, and a lookup of the active
//! document's diagnostics.
//!
//! A subscription is a single queue. Events from different sources reach it in
//! the order they were published.
//!
//! [`ChannelHost`] is the in-process implementation used by the daemon and by
//! tests. Whoever owns it feeds editor activity in with [`ChannelHost::publish`]
//! and the diagnostics setters.

use std::collections::{HashMap, HashSet};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::events::{Diagnostic, EventSource, HostEvent};

/// Default per-subscriber queue capacity
pub const DEFAULT_SUBSCRIPTION_CAPACITY: usize = 100;

/// What the correlator needs from the editor host
pub trait EditorHost: Send + Sync {
    /// Whether the host can deliver events for `source`
    ///
    /// Probed once per monitoring session for optional sources. The default
    /// implementation supports everything.
    fn supports(&self, source: EventSource) -> bool {
        let _ = source;
        true
    }

    /// Subscribe to `sources` on one ordered queue
    ///
    /// Sources the host cannot serve are left out; returns `None` when none of
    /// them is available. Dropping the receiver unsubscribes.
    fn subscribe(&self, sources: &[EventSource]) -> Option<mpsc::Receiver<HostEvent>>;

    /// Diagnostics of the active document in document order
    ///
    /// `None` when no document is active.
    fn active_diagnostics(&self) -> Option<Vec<Diagnostic>>;
}

#[derive(Default)]
struct DocumentState {
    active: Option<String>,
    diagnostics: HashMap<String, Vec<Diagnostic>>,
}

struct Subscriber {
    sources: HashSet<EventSource>,
    tx: mpsc::Sender<HostEvent>,
}

/// Channel-backed in-process host
pub struct ChannelHost {
    unsupported: HashSet<EventSource>,
    capacity: usize,
    subscribers: Mutex<Vec<Subscriber>>,
    documents: RwLock<DocumentState>,
}

impl Default for ChannelHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelHost {
    /// Create a host supporting every source
    #[must_use]
    pub fn new() -> Self {
        Self {
            unsupported: HashSet::new(),
            capacity: DEFAULT_SUBSCRIPTION_CAPACITY,
            subscribers: Mutex::new(Vec::new()),
            documents: RwLock::new(DocumentState::default()),
        }
    }

    /// Mark a source as unsupported by this host
    #[must_use]
    pub fn without(mut self, source: EventSource) -> Self {
        self.unsupported.insert(source);
        self
    }

    /// Set the per-subscriber queue capacity
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Deliver an event to every live subscriber of its source
    ///
    /// Returns how many subscribers received it. Closed subscribers are pruned;
    /// a full subscriber drops the event with a warning. Publishing is
    /// serialized, so each subscriber sees events in publish order.
    pub fn publish(&self, event: HostEvent) -> usize {
        let source = event.source();
        let mut subscribers = self.subscribers.lock();

        let mut delivered = 0;
        subscribers.retain(|subscriber| {
            if !subscriber.sources.contains(&source) {
                return !subscriber.tx.is_closed();
            }
            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(%source, "Subscriber queue full, dropping event");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
        if delivered == 0 {
            tracing::trace!(%source, "No subscribers for event");
        }
        delivered
    }

    /// Number of live subscriptions covering a source
    #[must_use]
    pub fn subscriber_count(&self, source: EventSource) -> usize {
        self.subscribers
            .lock()
            .iter()
            .filter(|s| s.sources.contains(&source) && !s.tx.is_closed())
            .count()
    }

    /// Change the active document without publishing an event
    pub fn set_active_document(&self, uri: Option<String>) {
        self.documents.write().active = uri;
    }

    /// Replace a document's diagnostics without publishing an event
    pub fn set_diagnostics(&self, uri: impl Into<String>, diagnostics: Vec<Diagnostic>) {
        let uri = uri.into();
        let mut docs = self.documents.write();
        if diagnostics.is_empty() {
            docs.diagnostics.remove(&uri);
        } else {
            docs.diagnostics.insert(uri, diagnostics);
        }
    }

    /// Update a document's diagnostics and publish `DiagnosticsChanged`
    pub fn report_diagnostics(&self, uri: impl Into<String>, diagnostics: Vec<Diagnostic>) {
        let uri = uri.into();
        self.set_diagnostics(uri.clone(), diagnostics);
        self.publish(HostEvent::DiagnosticsChanged { uris: vec![uri] });
    }

    /// Focus a document and publish `ActiveEditorChanged`
    pub fn focus(&self, uri: Option<String>) {
        self.set_active_document(uri.clone());
        self.publish(HostEvent::ActiveEditorChanged { uri });
    }
}

impl EditorHost for ChannelHost {
    fn supports(&self, source: EventSource) -> bool {
        !self.unsupported.contains(&source)
    }

    fn subscribe(&self, sources: &[EventSource]) -> Option<mpsc::Receiver<HostEvent>> {
        let sources: HashSet<_> = sources
            .iter()
            .copied()
            .filter(|source| self.supports(*source))
            .collect();
        if sources.is_empty() {
            return None;
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.lock().push(Subscriber { sources, tx });
        Some(rx)
    }

    fn active_diagnostics(&self) -> Option<Vec<Diagnostic>> {
        let docs = self.documents.read();
        let active = docs.active.as_ref()?;
        Some(docs.diagnostics.get(active).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ProcessKind, SelectionKind};

    #[test]
    fn test_publish_routes_by_source() {
        let host = ChannelHost::new();
        let mut selections = host.subscribe(&[EventSource::SelectionChanged]).unwrap();
        let mut tasks = host.subscribe(&[EventSource::TaskEnded]).unwrap();

        let delivered = host.publish(HostEvent::SelectionChanged {
            kind: SelectionKind::Mouse,
        });
        assert_eq!(delivered, 1);

        assert!(selections.try_recv().is_ok());
        assert!(tasks.try_recv().is_err());
    }

    #[test]
    fn test_one_queue_keeps_publish_order_across_sources() {
        let host = ChannelHost::new();
        let mut events = host
            .subscribe(&[EventSource::TaskEnded, EventSource::DocumentChanged])
            .unwrap();

        for round in 0..16 {
            host.publish(HostEvent::ProcessCompleted {
                kind: ProcessKind::Task,
                exit_code: Some(round),
            });
            host.publish(HostEvent::DocumentChanged {
                uri: "file:///a.rs".to_string(),
            });
        }

        for round in 0..16 {
            assert_eq!(
                events.try_recv().unwrap(),
                HostEvent::ProcessCompleted {
                    kind: ProcessKind::Task,
                    exit_code: Some(round),
                }
            );
            assert_eq!(events.try_recv().unwrap().source(), EventSource::DocumentChanged);
        }
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_unsupported_source_is_left_out() {
        let host = ChannelHost::new().without(EventSource::ShellExecutionEnded);

        assert!(!host.supports(EventSource::ShellExecutionEnded));
        assert!(host.subscribe(&[EventSource::ShellExecutionEnded]).is_none());

        let _events = host
            .subscribe(&[EventSource::TaskEnded, EventSource::ShellExecutionEnded])
            .unwrap();
        assert_eq!(host.subscriber_count(EventSource::TaskEnded), 1);
        assert_eq!(host.subscriber_count(EventSource::ShellExecutionEnded), 0);
        assert_eq!(
            host.publish(HostEvent::ProcessCompleted {
                kind: ProcessKind::Shell,
                exit_code: Some(0),
            }),
            0
        );
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let host = ChannelHost::new();
        let rx = host.subscribe(&[EventSource::Command]).unwrap();
        assert_eq!(host.subscriber_count(EventSource::Command), 1);

        drop(rx);
        host.publish(HostEvent::CommandInvoked {
            command: "noop".to_string(),
        });
        assert_eq!(host.subscriber_count(EventSource::Command), 0);
        assert!(host.subscribers.lock().is_empty());
    }

    #[test]
    fn test_active_diagnostics_follow_focus() {
        let host = ChannelHost::new();
        assert_eq!(host.active_diagnostics(), None);

        host.set_diagnostics("file:///a.rs", vec![Diagnostic::error(5)]);
        host.set_active_document(Some("file:///b.rs".to_string()));
        assert_eq!(host.active_diagnostics(), Some(Vec::new()));

        host.set_active_document(Some("file:///a.rs".to_string()));
        assert_eq!(host.active_diagnostics(), Some(vec![Diagnostic::error(5)]));

        host.set_diagnostics("file:///a.rs", Vec::new());
        assert_eq!(host.active_diagnostics(), Some(Vec::new()));
    }
}
