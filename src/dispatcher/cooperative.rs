//! Reference dispatcher shape (b) from §4.3: no thread of its own. The host
//! application drives it by calling [`CooperativeDispatcher::dispatch_once`]
//! (or [`CooperativeDispatcher::dispatch_events`]) from its own event loop -
//! a glib/Qt/embedded-superloop main loop being the typical caller.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::dispatcher::{EventHandlerFn, HsmEventDispatcher, TimerHandlerFn};
use crate::types::{EventId, HandlerId, TimerId};

struct TimerState {
    handler: HandlerId,
    interval_ms: u32,
    single_shot: bool,
    deadline: Instant,
}

#[derive(Default)]
struct State {
    event_handlers: HashMap<HandlerId, EventHandlerFn>,
    timer_handlers: HashMap<HandlerId, TimerHandlerFn>,
    timers: HashMap<TimerId, TimerState>,
    /// Pairs stashed by `enqueue_event`, drained by the engine's own
    /// `poll_enqueued()` call from inside the invoked event handler.
    isr_queue: VecDeque<(HandlerId, EventId)>,
}

/// Dispatcher with no background thread; `dispatch_once` must be polled by
/// the host's own loop. Safe to call from a single thread only - unlike
/// [`super::std_thread::StdThreadDispatcher`] this is not meant to be driven
/// concurrently from multiple callers.
pub struct CooperativeDispatcher {
    state: Mutex<State>,
    next_handler_id: AtomicI32,
    pending_wake: AtomicBool,
}

impl Default for CooperativeDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CooperativeDispatcher {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            next_handler_id: AtomicI32::new(crate::dispatcher::INVALID_HANDLER_ID.0),
            pending_wake: AtomicBool::new(false),
        }
    }

    fn next_id(&self) -> HandlerId {
        HandlerId(self.next_handler_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Runs one iteration: fires any elapsed timers, then invokes the event
    /// handlers if `emit_event` has been called since the last dispatch.
    /// Returns `true` if anything was dispatched.
    pub fn dispatch_once(&self) -> bool {
        let now = Instant::now();
        let (fired, woke) = {
            let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let mut fired = Vec::new();
            let mut to_remove = Vec::new();
            for (timer_id, t) in guard.timers.iter_mut() {
                if t.deadline <= now {
                    fired.push((*timer_id, t.handler));
                    if t.single_shot {
                        to_remove.push(*timer_id);
                    } else {
                        t.deadline = now + Duration::from_millis(t.interval_ms as u64);
                    }
                }
            }
            for id in &to_remove {
                guard.timers.remove(id);
            }
            let woke = self.pending_wake.swap(false, Ordering::SeqCst);
            (fired, woke)
        };

        if woke {
            let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
            for handler in guard.event_handlers.values() {
                handler();
            }
        }
        for (timer_id, handler_id) in &fired {
            let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(handler) = guard.timer_handlers.get(handler_id) {
                handler(*timer_id);
            }
        }
        woke || !fired.is_empty()
    }

    /// Calls `dispatch_once` repeatedly until it reports nothing left to do.
    /// Convenience for hosts that just want to drain everything at a
    /// natural idle point rather than reason about individual ticks.
    pub fn dispatch_events(&self) {
        while self.dispatch_once() {}
    }
}

impl HsmEventDispatcher for CooperativeDispatcher {
    fn register_event_handler(&self, handler: EventHandlerFn) -> HandlerId {
        let id = self.next_id();
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .event_handlers
            .insert(id, handler);
        id
    }

    fn unregister_event_handler(&self, handler: HandlerId) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .event_handlers
            .remove(&handler);
    }

    fn emit_event(&self, _handler: HandlerId) {
        self.pending_wake.store(true, Ordering::SeqCst);
    }

    fn enqueue_event(&self, handler: HandlerId, event: EventId) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .isr_queue
            .push_back((handler, event));
        self.emit_event(handler);
        true
    }

    fn poll_enqueued(&self) -> Option<(HandlerId, EventId)> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).isr_queue.pop_front()
    }

    fn register_timer_handler(&self, handler: TimerHandlerFn) -> HandlerId {
        let id = self.next_id();
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .timer_handlers
            .insert(id, handler);
        id
    }

    fn unregister_timer_handler(&self, handler: HandlerId) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        guard.timer_handlers.remove(&handler);
        guard.timers.retain(|_, t| t.handler != handler);
    }

    fn start_timer(&self, handler: HandlerId, timer_id: TimerId, interval_ms: u32, single_shot: bool) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).timers.insert(
            timer_id,
            TimerState {
                handler,
                interval_ms,
                single_shot,
                deadline: Instant::now() + Duration::from_millis(interval_ms as u64),
            },
        );
    }

    fn restart_timer(&self, timer_id: TimerId) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(t) = guard.timers.get_mut(&timer_id) {
            t.deadline = Instant::now() + Duration::from_millis(t.interval_ms as u64);
        }
    }

    fn stop_timer(&self, timer_id: TimerId) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).timers.remove(&timer_id);
    }

    fn is_timer_running(&self, timer_id: TimerId) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .timers
            .contains_key(&timer_id)
    }

    fn start(&self) -> bool {
        // Nothing to spin up: the host calls `dispatch_once`/`dispatch_events` itself.
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn dispatch_once_runs_event_handler_exactly_when_woken() {
        let dispatcher = CooperativeDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let handler = dispatcher.register_event_handler(Box::new(move || {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(!dispatcher.dispatch_once());
        dispatcher.emit_event(handler);
        assert!(dispatcher.dispatch_once());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!dispatcher.dispatch_once());
    }

    #[test]
    fn enqueue_event_is_delivered_via_poll_enqueued() {
        let dispatcher = Arc::new(CooperativeDispatcher::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let for_handler = dispatcher.clone();
        let handler = dispatcher.register_event_handler(Box::new(move || {
            while let Some((_, event)) = for_handler.poll_enqueued() {
                seen2.lock().unwrap().push(event);
            }
        }));
        dispatcher.enqueue_event(handler, EventId(7));
        dispatcher.enqueue_event(handler, EventId(8));
        dispatcher.dispatch_once();
        assert_eq!(*seen.lock().unwrap(), vec![EventId(7), EventId(8)]);
    }

    #[test]
    fn repeating_timer_reschedules_until_stopped() {
        let dispatcher = CooperativeDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let handler = dispatcher.register_timer_handler(Box::new(move |_id| {
            calls2.fetch_add(1, Ordering::SeqCst);
        }));
        dispatcher.start_timer(handler, TimerId(1), 1, false);
        std::thread::sleep(Duration::from_millis(5));
        dispatcher.dispatch_once();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(dispatcher.is_timer_running(TimerId(1)));
        dispatcher.stop_timer(TimerId(1));
        assert!(!dispatcher.is_timer_running(TimerId(1)));
    }
}
