//! Single-shot timer slots
//!
//! Each slot holds at most one pending timer. Arming always cancels the
//! previous timer first, and every timer carries a ticket so a timer that
//! already woke up but lost the race to a cancel can tell it is stale.

use std::future::Future;
use std::time::Duration;

use tokio::task::AbortHandle;

/// Ticket identifying one armed timer
pub(crate) type Ticket = u64;

struct Pending {
    ticket: Ticket,
    handle: AbortHandle,
}

/// A slot for at most one outstanding single-shot timer
pub(crate) struct TimerSlot {
    name: &'static str,
    issued: Ticket,
    pending: Option<Pending>,
}

impl TimerSlot {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            issued: 0,
            pending: None,
        }
    }

    /// Cancel any pending timer, then run `on_elapsed(ticket)` after `delay`
    ///
    /// Must be called from within a tokio runtime. Callers hold the owning
    /// state lock so cancel and re-arm happen as one step.
    pub(crate) fn arm<F, Fut>(&mut self, delay: Duration, on_elapsed: F)
    where
        F: FnOnce(Ticket) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        self.issued += 1;
        let ticket = self.issued;
        let fire = on_elapsed(ticket);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire.await;
        });

        tracing::trace!(timer = self.name, ticket, ?delay, "Timer armed");
        self.pending = Some(Pending {
            ticket,
            handle: task.abort_handle(),
        });
    }

    /// Cancel the pending timer; returns whether one was pending
    pub(crate) fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.handle.abort();
                tracing::trace!(timer = self.name, ticket = pending.ticket, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Claim the slot for a timer that just elapsed
    ///
    /// Returns `false` when `ticket` was cancelled or replaced in the meantime;
    /// the caller must then do nothing.
    pub(crate) fn claim(&mut self, ticket: Ticket) -> bool {
        match &self.pending {
            Some(pending) if pending.ticket == ticket => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
