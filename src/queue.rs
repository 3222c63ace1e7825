//! Event Queue (C2): an ordered, mutex-protected buffer of pending events
//! with optional one-shot completion handles for synchronous waiters.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::types::{EventId, TransitionStatus};
use crate::variant::VariantVec;

/// One-shot notification delivered exactly once to a `transition_sync`
/// waiter (§9: "model as a per-event one-shot notification").
pub(crate) struct Completion {
    status: Mutex<Option<TransitionStatus>>,
    condvar: Condvar,
}

impl Completion {
    fn new() -> Self {
        Self {
            status: Mutex::new(None),
            condvar: Condvar::new(),
        }
    }

    pub(crate) fn resolve(&self, status: TransitionStatus) {
        let mut guard = self.status.lock().unwrap_or_else(|e| e.into_inner());
        if guard.is_none() {
            *guard = Some(status);
            self.condvar.notify_all();
        }
    }

    /// Blocks until resolved or `timeout` elapses. Returns `None` on timeout.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> Option<TransitionStatus> {
        let guard = self.status.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = self
            .condvar
            .wait_timeout_while(guard, timeout, |s| s.is_none())
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

/// A single event awaiting processing by the execution engine.
pub(crate) struct PendingEvent {
    pub event: EventId,
    pub args: VariantVec,
    pub completion: Option<Arc<Completion>>,
    /// `true` for events synthesized by a final state's implicit exit
    /// (§4.4.1 step 5) - carried through only for debug-log fidelity.
    pub synthesized: bool,
}

impl PendingEvent {
    pub fn new(event: EventId, args: VariantVec) -> Self {
        Self {
            event,
            args,
            completion: None,
            synthesized: false,
        }
    }

    pub fn synthesized(event: EventId, args: VariantVec) -> Self {
        Self {
            event,
            args,
            completion: None,
            synthesized: true,
        }
    }

    pub fn with_completion(mut self) -> (Self, Arc<Completion>) {
        let completion = Arc::new(Completion::new());
        self.completion = Some(completion.clone());
        (self, completion)
    }

    pub fn finish(&self, status: TransitionStatus) {
        if let Some(c) = &self.completion {
            c.resolve(status);
        }
    }
}

/// Ordered append-tail/remove-head buffer, shared between posting threads
/// (or ISRs, via the dispatcher's own bounded queue) and the engine.
#[derive(Default)]
pub(crate) struct EventQueue {
    items: Mutex<VecDeque<PendingEvent>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&self, event: PendingEvent) {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).push_back(event);
    }

    pub fn push_front(&self, event: PendingEvent) {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).push_front(event);
    }

    /// Atomically discards every queued event (canceling their waiters) and
    /// installs `event` as the sole remaining entry (§4.4 `transition_with_queue_clear`).
    pub fn push_front_clear_others(&self, event: PendingEvent) {
        let mut guard = self.items.lock().unwrap_or_else(|e| e.into_inner());
        for stale in guard.drain(..) {
            stale.finish(TransitionStatus::Canceled);
        }
        guard.push_back(event);
    }

    pub fn pop_front(&self) -> Option<PendingEvent> {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    /// Cancels and drops every queued event (`release()`, §5 cancellation).
    pub fn clear_canceling(&self) {
        let mut guard = self.items.lock().unwrap_or_else(|e| e.into_inner());
        for stale in guard.drain(..) {
            stale.finish(TransitionStatus::Canceled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_ordering() {
        let q = EventQueue::new();
        q.push_back(PendingEvent::new(EventId(1), VariantVec::new()));
        q.push_back(PendingEvent::new(EventId(2), VariantVec::new()));
        assert_eq!(q.pop_front().unwrap().event, EventId(1));
        assert_eq!(q.pop_front().unwrap().event, EventId(2));
        assert!(q.pop_front().is_none());
    }

    #[test]
    fn queue_clear_cancels_stale_waiters() {
        let q = EventQueue::new();
        let (ev1, completion1) = PendingEvent::new(EventId(1), VariantVec::new()).with_completion();
        q.push_back(ev1);
        let replacement = PendingEvent::new(EventId(2), VariantVec::new());
        q.push_front_clear_others(replacement);

        assert_eq!(
            completion1.wait_timeout(Duration::from_millis(10)),
            Some(TransitionStatus::Canceled)
        );
        let next = q.pop_front().unwrap();
        assert_eq!(next.event, EventId(2));
        assert!(q.pop_front().is_none());
    }

    #[test]
    fn synchronous_wait_times_out_without_resolution() {
        let (event, completion) = PendingEvent::new(EventId(7), VariantVec::new()).with_completion();
        drop(event);
        assert_eq!(completion.wait_timeout(Duration::from_millis(5)), None);
    }
}
