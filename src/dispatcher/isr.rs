//! Reference dispatcher shape (c) from §4.3: interrupt-safe. `emit_event`
//! and `enqueue_event` never block and never allocate - they only ever
//! touch a `critical_section`-guarded, fixed-capacity `heapless::Deque`, the
//! same pattern the teacher's `concurrent` feature used for its per-FSM
//! pending-event queue (see `PENDING_QUEUE_*` in the macro it generated).
//!
//! Handler and timer bookkeeping still goes through the same guard: none of
//! it is ever touched from interrupt context in practice (registration
//! happens once at startup), but sharing one lock keeps the dispatcher
//! simple and avoids a second, rarely-exercised synchronization primitive.

use core::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use critical_section::Mutex as CsMutex;
use heapless::Deque;

use crate::dispatcher::{EventHandlerFn, HsmEventDispatcher, TimerHandlerFn};
use crate::types::{EventId, HandlerId, TimerId};

/// Default capacity of the ISR-safe pending-event queue. Matches the
/// teacher's default `QueueCapacity`.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

const MAX_HANDLERS: usize = 4;
const MAX_TIMERS: usize = 8;

struct TimerSlot {
    timer_id: TimerId,
    handler: HandlerId,
    interval_ms: u32,
    single_shot: bool,
    deadline: Instant,
}

// Handlers are kept behind `Arc` rather than the bare boxed closures so
// `dispatch_events` can clone the handful that matter out of the
// `critical_section`-guarded `RefCell`, drop the borrow, and only then
// invoke them - a handler that calls back into the dispatcher (timer
// start/stop, `poll_enqueued`) would otherwise hit a `RefCell`
// already-borrowed panic.
struct Inner {
    event_handlers: [Option<(HandlerId, Arc<dyn Fn() + Send + Sync>)>; MAX_HANDLERS],
    timer_handlers: [Option<(HandlerId, Arc<dyn Fn(TimerId) + Send + Sync>)>; MAX_HANDLERS],
    timers: [Option<TimerSlot>; MAX_TIMERS],
    next_id: i32,
}

impl Inner {
    const fn new() -> Self {
        Self {
            event_handlers: [None, None, None, None],
            timer_handlers: [None, None, None, None],
            timers: [None, None, None, None, None, None, None, None],
            next_id: crate::dispatcher::INVALID_HANDLER_ID.0,
        }
    }

    fn next_handler_id(&mut self) -> HandlerId {
        self.next_id += 1;
        HandlerId(self.next_id)
    }
}

/// Interrupt-safe dispatcher with a bounded `QCAP`-deep event queue.
/// `dispatch_once`/`dispatch_events` are called from the host's own loop
/// (a superloop, an RTOS task, or a simulated ISR poller in tests), never
/// automatically - there is no background thread, by design, so that it
/// remains usable on targets with no OS.
pub struct IsrDispatcher<const QCAP: usize = DEFAULT_QUEUE_CAPACITY> {
    inner: CsMutex<RefCell<Inner>>,
    queue: CsMutex<RefCell<Deque<(HandlerId, EventId), QCAP>>>,
    dropped_events: AtomicUsize,
}

impl<const QCAP: usize> Default for IsrDispatcher<QCAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const QCAP: usize> IsrDispatcher<QCAP> {
    pub fn new() -> Self {
        Self {
            inner: CsMutex::new(RefCell::new(Inner::new())),
            queue: CsMutex::new(RefCell::new(Deque::new())),
            dropped_events: AtomicUsize::new(0),
        }
    }

    /// Count of events silently dropped because the queue was full when
    /// `enqueue_event` (or an ISR-raised `emit_event`) was called.
    pub fn dropped_events_count(&self) -> usize {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn reset_dropped_count(&self) {
        self.dropped_events.store(0, Ordering::Relaxed);
    }

    /// Drains every queued `(handler, event)` pair and invokes the matching
    /// registered event handler for each, then fires any elapsed timers.
    /// Call this from the host's main loop, never from the simulated ISR
    /// side. Returns `true` if anything was dispatched.
    pub fn dispatch_events(&self) -> bool {
        // Only peek at the queue here: the actual `(handler, event)` pairs
        // are drained by the engine's `poll_enqueued()` call from inside the
        // invoked handler, not by this loop, so an event is consumed exactly
        // once.
        let has_pending = critical_section::with(|cs| !self.queue.borrow(cs).borrow().is_empty());
        let mut dispatched = false;
        if has_pending {
            dispatched = true;
            // Clone the handler `Arc`s out and drop the borrow before
            // invoking: a handler calling back into `poll_enqueued` or a
            // timer method would otherwise double-borrow this same `RefCell`.
            let handlers: Vec<Arc<dyn Fn() + Send + Sync>> = critical_section::with(|cs| {
                self.inner.borrow(cs).borrow().event_handlers.iter().flatten().map(|(_, h)| h.clone()).collect()
            });
            for handler in &handlers {
                handler();
            }
        }

        let now = Instant::now();
        let fired: Vec<(TimerId, HandlerId)> = critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            let mut fired = Vec::new();
            for slot in inner.timers.iter_mut() {
                if let Some(t) = slot {
                    if t.deadline <= now {
                        fired.push((t.timer_id, t.handler));
                        if t.single_shot {
                            *slot = None;
                        } else {
                            t.deadline = now + Duration::from_millis(t.interval_ms as u64);
                        }
                    }
                }
            }
            fired
        });
        if !fired.is_empty() {
            dispatched = true;
        }
        for (timer_id, handler_id) in fired {
            let handler = critical_section::with(|cs| {
                self.inner
                    .borrow(cs)
                    .borrow()
                    .timer_handlers
                    .iter()
                    .flatten()
                    .find(|(id, _)| *id == handler_id)
                    .map(|(_, h)| h.clone())
            });
            if let Some(handler) = handler {
                handler(timer_id);
            }
        }
        dispatched
    }
}

impl<const QCAP: usize> HsmEventDispatcher for IsrDispatcher<QCAP> {
    fn register_event_handler(&self, handler: EventHandlerFn) -> HandlerId {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            let id = inner.next_handler_id();
            let handler: Arc<dyn Fn() + Send + Sync> = Arc::from(handler);
            for slot in inner.event_handlers.iter_mut() {
                if slot.is_none() {
                    *slot = Some((id, handler));
                    return id;
                }
            }
            id
        })
    }

    fn unregister_event_handler(&self, handler: HandlerId) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            for slot in inner.event_handlers.iter_mut() {
                if matches!(slot, Some((id, _)) if *id == handler) {
                    *slot = None;
                }
            }
        });
    }

    /// Shares `enqueue_event`'s queue rather than a dedicated wake flag:
    /// `EventId::INVALID` marks the pair as a wake-only signal, which the
    /// engine's `process_queue` recognizes and discards instead of turning
    /// into a pending event.
    fn emit_event(&self, handler: HandlerId) {
        self.enqueue_event(handler, EventId::INVALID);
    }

    /// Interrupt-safe: never blocks, never allocates. Drops the event and
    /// bumps [`Self::dropped_events_count`] if the bounded queue is full.
    fn enqueue_event(&self, handler: HandlerId, event: EventId) -> bool {
        let ok = critical_section::with(|cs| {
            self.queue.borrow(cs).borrow_mut().push_back((handler, event)).is_ok()
        });
        if !ok {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        ok
    }

    fn poll_enqueued(&self) -> Option<(HandlerId, EventId)> {
        critical_section::with(|cs| self.queue.borrow(cs).borrow_mut().pop_front())
    }

    fn register_timer_handler(&self, handler: TimerHandlerFn) -> HandlerId {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            let id = inner.next_handler_id();
            let handler: Arc<dyn Fn(TimerId) + Send + Sync> = Arc::from(handler);
            for slot in inner.timer_handlers.iter_mut() {
                if slot.is_none() {
                    *slot = Some((id, handler));
                    return id;
                }
            }
            id
        })
    }

    fn unregister_timer_handler(&self, handler: HandlerId) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            for slot in inner.timer_handlers.iter_mut() {
                if matches!(slot, Some((id, _)) if *id == handler) {
                    *slot = None;
                }
            }
            for slot in inner.timers.iter_mut() {
                if matches!(slot, Some(t) if t.handler == handler) {
                    *slot = None;
                }
            }
        });
    }

    fn start_timer(&self, handler: HandlerId, timer_id: TimerId, interval_ms: u32, single_shot: bool) {
        let deadline = Instant::now() + Duration::from_millis(interval_ms as u64);
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            for slot in inner.timers.iter_mut() {
                if matches!(slot, Some(t) if t.timer_id == timer_id) {
                    *slot = None;
                }
            }
            for slot in inner.timers.iter_mut() {
                if slot.is_none() {
                    *slot = Some(TimerSlot {
                        timer_id,
                        handler,
                        interval_ms,
                        single_shot,
                        deadline,
                    });
                    break;
                }
            }
        });
    }

    fn restart_timer(&self, timer_id: TimerId) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            for slot in inner.timers.iter_mut() {
                if let Some(t) = slot {
                    if t.timer_id == timer_id {
                        t.deadline = Instant::now() + Duration::from_millis(t.interval_ms as u64);
                    }
                }
            }
        });
    }

    fn stop_timer(&self, timer_id: TimerId) {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow(cs).borrow_mut();
            for slot in inner.timers.iter_mut() {
                if matches!(slot, Some(t) if t.timer_id == timer_id) {
                    *slot = None;
                }
            }
        });
    }

    fn is_timer_running(&self, timer_id: TimerId) -> bool {
        critical_section::with(|cs| {
            self.inner
                .borrow(cs)
                .borrow()
                .timers
                .iter()
                .any(|slot| matches!(slot, Some(t) if t.timer_id == timer_id))
        })
    }

    fn start(&self) -> bool {
        // No background thread: the host (or a simulated ISR poller in
        // tests) drives `dispatch_events` itself.
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::sync::Arc;

    #[test]
    fn queue_overflow_is_counted_not_panicked() {
        let dispatcher: IsrDispatcher<2> = IsrDispatcher::new();
        let handler = dispatcher.register_event_handler(Box::new(|| {}));
        assert!(dispatcher.enqueue_event(handler, EventId(1)));
        assert!(dispatcher.enqueue_event(handler, EventId(2)));
        assert!(!dispatcher.enqueue_event(handler, EventId(3)));
        assert_eq!(dispatcher.dropped_events_count(), 1);
    }

    #[test]
    fn dispatch_events_delivers_queued_pairs_to_poll_enqueued_in_fifo_order() {
        // Mirrors how the execution engine's real event handler behaves: it
        // doesn't receive the event as an argument, it drains everything
        // waiting via `poll_enqueued()` from inside the handler invocation
        // `dispatch_events` triggers.
        let dispatcher = Arc::new(IsrDispatcher::<4>::new());
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let for_handler = dispatcher.clone();
        let handler = dispatcher.register_event_handler(Box::new(move || {
            while let Some((_, event)) = for_handler.poll_enqueued() {
                seen2.lock().unwrap().push(event);
            }
        }));
        dispatcher.enqueue_event(handler, EventId(1));
        dispatcher.enqueue_event(handler, EventId(2));
        dispatcher.dispatch_events();
        assert_eq!(*seen.lock().unwrap(), vec![EventId(1), EventId(2)]);
    }

    #[test]
    fn single_shot_timer_is_removed_after_firing() {
        let dispatcher: IsrDispatcher<4> = IsrDispatcher::new();
        let fired = Arc::new(StdAtomicUsize::new(0));
        let fired2 = fired.clone();
        let handler = dispatcher.register_timer_handler(Box::new(move |_id| {
            fired2.fetch_add(1, Ordering::Relaxed);
        }));
        dispatcher.start_timer(handler, TimerId(9), 1, true);
        std::thread::sleep(Duration::from_millis(5));
        dispatcher.dispatch_events();
        assert_eq!(fired.load(Ordering::Relaxed), 1);
        assert!(!dispatcher.is_timer_running(TimerId(9)));
    }
}
