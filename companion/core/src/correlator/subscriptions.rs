//! Subscription table
//!
//! Every host event source the correlator listens to, and the handler it is
//! routed to. All of them share one ordered subscription, installed once by
//! `start_monitoring` and torn down once by `dispose`.

use tokio_stream::wrappers::ReceiverStream;

use crate::events::{EventSource, HostEvent};
use crate::host::EditorHost;

/// Correlator entry point an event source feeds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Handler {
    /// Typing and navigation
    Activity,
    /// Mouse selections dismiss, everything else is activity
    Selection,
    /// Diagnostics recomputed
    Diagnostics,
    /// An external process completed
    ProcessCompletion,
    /// Settings changed
    Configuration,
    /// Command invoked
    Command,
}

/// One row of the subscription table
#[derive(Clone, Copy, Debug)]
pub(crate) struct Subscription {
    pub source: EventSource,
    pub handler: Handler,
    /// Probed with `EditorHost::supports` and skipped quietly when absent
    pub optional: bool,
}

const fn required(source: EventSource, handler: Handler) -> Subscription {
    Subscription {
        source,
        handler,
        optional: false,
    }
}

pub(crate) const SUBSCRIPTIONS: &[Subscription] = &[
    required(EventSource::DocumentChanged, Handler::Activity),
    required(EventSource::ActiveEditorChanged, Handler::Activity),
    required(EventSource::SelectionChanged, Handler::Selection),
    required(EventSource::DiagnosticsChanged, Handler::Diagnostics),
    required(EventSource::TaskEnded, Handler::ProcessCompletion),
    required(EventSource::DebugSessionEnded, Handler::ProcessCompletion),
    Subscription {
        source: EventSource::ShellExecutionEnded,
        handler: Handler::ProcessCompletion,
        optional: true,
    },
    required(EventSource::ConfigurationChanged, Handler::Configuration),
    required(EventSource::Command, Handler::Command),
];

/// Handler for a source, if the correlator subscribes to it
pub(crate) fn route(source: EventSource) -> Option<Handler> {
    SUBSCRIPTIONS
        .iter()
        .find(|s| s.source == source)
        .map(|s| s.handler)
}

/// Sources to subscribe to: every required row, plus optional rows the host
/// reports support for
pub(crate) fn wanted_sources(host: &dyn EditorHost) -> Vec<EventSource> {
    let mut sources = Vec::with_capacity(SUBSCRIPTIONS.len());

    for subscription in SUBSCRIPTIONS {
        if sources.contains(&subscription.source) {
            continue;
        }
        if !host.supports(subscription.source) {
            if subscription.optional {
                tracing::info!(
                    source = %subscription.source,
                    "Host does not provide optional event source, not subscribing"
                );
            } else {
                tracing::warn!(source = %subscription.source, "Host lacks required event source");
            }
            continue;
        }
        sources.push(subscription.source);
    }
    sources
}

/// Subscribe to every table row the host can serve, on one ordered stream
///
/// `None` when the host serves none of them.
pub(crate) fn subscribe_all(host: &dyn EditorHost) -> Option<ReceiverStream<HostEvent>> {
    let sources = wanted_sources(host);
    let Some(events) = host.subscribe(&sources) else {
        tracing::warn!("Host refused subscription");
        return None;
    };

    tracing::debug!(count = sources.len(), "Subscribed to host event sources");
    Some(ReceiverStream::new(events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ChannelHost;

    #[test]
    fn test_every_source_is_routed_once() {
        for source in EventSource::ALL {
            let rows = SUBSCRIPTIONS.iter().filter(|s| s.source == source).count();
            assert_eq!(rows, 1, "{source} should appear exactly once");
        }
    }

    #[test]
    fn test_only_shell_is_optional() {
        let optional: Vec<_> = SUBSCRIPTIONS
            .iter()
            .filter(|s| s.optional)
            .map(|s| s.source)
            .collect();
        assert_eq!(optional, vec![EventSource::ShellExecutionEnded]);
    }

    #[test]
    fn test_route() {
        assert_eq!(route(EventSource::TaskEnded), Some(Handler::ProcessCompletion));
        assert_eq!(route(EventSource::SelectionChanged), Some(Handler::Selection));
    }

    #[test]
    fn test_subscribe_all_skips_unsupported_optional_source() {
        let host = ChannelHost::new().without(EventSource::ShellExecutionEnded);

        let sources = wanted_sources(&host);
        assert_eq!(sources.len(), SUBSCRIPTIONS.len() - 1);
        assert!(!sources.contains(&EventSource::ShellExecutionEnded));

        let _events = subscribe_all(&host).unwrap();
        assert_eq!(host.subscriber_count(EventSource::DocumentChanged), 1);
        assert_eq!(host.subscriber_count(EventSource::ShellExecutionEnded), 0);
    }

    #[test]
    fn test_subscribe_all_uses_a_single_subscription() {
        let host = ChannelHost::new();
        let _events = subscribe_all(&host).unwrap();

        for source in EventSource::ALL {
            assert_eq!(host.subscriber_count(source), 1, "{source}");
        }
    }
}
