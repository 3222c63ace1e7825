//! Dispatcher Boundary (C3): the abstract contract between the execution
//! engine and whatever event loop actually hosts it (§4.3).
//!
//! The engine only ever talks to a `dyn HsmEventDispatcher`; it never knows
//! whether the concrete implementation is a dedicated worker thread, a
//! cooperative loop the host polls, or an interrupt-driven queue drained by
//! a scheduler task. Three reference shapes ship in this module's
//! submodules; application code can implement the trait for anything else.

use crate::types::{HandlerId, TimerId};

pub mod cooperative;
pub mod std_thread;

#[cfg(feature = "concurrent")]
pub mod isr;

/// Invoked by the dispatcher whenever it wants the engine to drain its
/// event queue. Takes no arguments: the engine already knows what is
/// pending via its own queue (C2).
pub type EventHandlerFn = Box<dyn Fn() + Send + Sync>;

/// Invoked by the dispatcher when a timer fires.
pub type TimerHandlerFn = Box<dyn Fn(TimerId) + Send + Sync>;

/// Sentinel returned by a dispatcher that has no registered handler yet
/// (mirrors hsmcpp's `INVALID_HSM_DISPATCHER_HANDLER_ID`).
pub const INVALID_HANDLER_ID: HandlerId = HandlerId(0);

/// The abstract event-loop boundary the execution engine is built against.
///
/// All methods take `&self`: dispatchers use interior mutability so that
/// `emit_event`/`enqueue_event` remain usable from any thread (including an
/// ISR, for implementations that support it) without the engine having to
/// hold an exclusive reference.
pub trait HsmEventDispatcher: Send + Sync {
    /// Registers the handler the dispatcher invokes to ask the engine to
    /// drain pending events. Returns a handle used to unregister it.
    fn register_event_handler(&self, handler: EventHandlerFn) -> HandlerId;

    /// After this returns, the unregistered handler must not be invoked again.
    fn unregister_event_handler(&self, handler: HandlerId);

    /// Thread-safe. Schedules a future invocation of `handler`'s event
    /// handler. Multiple calls before the loop actually runs are coalesced
    /// to at least one invocation.
    fn emit_event(&self, handler: HandlerId);

    /// Interrupt-safe, bounded-queue variant of `emit_event` that also
    /// carries the event id, for dispatchers that cannot take the engine's
    /// own queue lock from interrupt context. Returns `false` if the
    /// dispatcher's internal queue is full (§7 `TimerQueueFull`/`QueueFull`).
    ///
    /// The default implementation simply forwards to `emit_event` and
    /// reports the event through `poll_enqueued`, which is adequate for any
    /// dispatcher that is always safe to lock (the std-threaded and
    /// cooperative reference dispatchers both qualify).
    fn enqueue_event(&self, handler: HandlerId, event: crate::types::EventId) -> bool;

    /// Drains one `(handler, event)` pair stored by `enqueue_event`, if any.
    /// Dispatchers that deliver enqueued events straight to the registered
    /// event handler (rather than staging them) can leave this at the
    /// default `None`.
    fn poll_enqueued(&self) -> Option<(HandlerId, crate::types::EventId)> {
        None
    }

    /// Registers the handler invoked when a timer fires.
    fn register_timer_handler(&self, handler: TimerHandlerFn) -> HandlerId;

    fn unregister_timer_handler(&self, handler: HandlerId);

    /// Schedules `timer_id` to fire after `interval_ms`. Restarts it with
    /// the new parameters if it was already running.
    fn start_timer(&self, handler: HandlerId, timer_id: TimerId, interval_ms: u32, single_shot: bool);

    /// Restarts a running timer with its original parameters. No-op if not running.
    fn restart_timer(&self, timer_id: TimerId);

    /// Stops a running timer. No-op if not running.
    fn stop_timer(&self, timer_id: TimerId);

    fn is_timer_running(&self, timer_id: TimerId) -> bool;

    /// Begins dispatching. Idempotent: calling this more than once has no
    /// additional effect. Returns `true` if dispatching is running
    /// (whether just started or already was).
    fn start(&self) -> bool;
}
