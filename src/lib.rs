//! # hsm-rt: Hierarchical State Machine Runtime
//!
//! A runtime (as opposed to macro-generated) hierarchical state machine
//! engine for desktop and embedded targets: nested states with entry
//! points, shallow/deep history, guarded transitions, timers, and a
//! pluggable event-loop dispatcher boundary so the same engine runs on a
//! worker thread, a cooperative host loop, or an interrupt-driven queue.
//!
//! ## Design Philosophy
//!
//! - **Runtime topology:** states and transitions are registered at runtime
//!   against opaque integer ids, not encoded in the type system - suited to
//!   machines whose shape is data (loaded, generated, or simply too large to
//!   spell out as an enum) rather than fixed at compile time.
//! - **Dispatcher-agnostic:** the engine only ever talks to a
//!   `dyn HsmEventDispatcher`; three reference shapes ship in [`dispatcher`].
//! - **Never panics:** the public API reports failure as `bool`/`Option`,
//!   never `Result` or a panic - structural mistakes are rejected at
//!   registration time instead.
//!
//! ## Quick Start
//!
//! ```rust
//! use hsm_rt::{Hsm, StateId, EventId, StateCallbacks};
//! use hsm_rt::dispatcher::cooperative::CooperativeDispatcher;
//! use std::sync::Arc;
//!
//! const OFF: StateId = StateId(0);
//! const ON: StateId = StateId(1);
//! const SWITCH: EventId = EventId(0);
//!
//! let mut hsm = Hsm::new();
//! hsm.register_state(OFF, StateCallbacks::new());
//! hsm.register_state(ON, StateCallbacks::new());
//! hsm.register_transition(OFF, ON, SWITCH, None, None, true);
//! hsm.register_transition(ON, OFF, SWITCH, None, None, true);
//!
//! let dispatcher = Arc::new(CooperativeDispatcher::new());
//! hsm.initialize(dispatcher.clone(), OFF);
//! hsm.transition(SWITCH, Vec::new());
//! dispatcher.dispatch_events();
//! assert!(hsm.is_state_active(ON));
//! ```

mod callbacks;
mod debug_log;
mod engine;
pub mod dispatcher;
mod error;
mod queue;
mod store;
mod types;
mod variant;

pub use callbacks::{
    FailedTransitionCallback, GuardCallback, HistoryCallback, StateCallbacks, StateChangedCallback,
    StateEnterCallback, StateExitCallback, TransitionCallback,
};
pub use debug_log::{ActionKind, DebugLogRecord, DebugLogSink, FileDebugLogSink, MemoryDebugLogSink};
pub use dispatcher::HsmEventDispatcher;
pub use engine::Hsm;
pub use error::{HsmError, HsmResult};
pub use store::StructureStore;
pub use types::{
    EventId, HandlerId, HistoryType, StateAction, StateActionTrigger, StateId, TimerId, TransitionStatus,
    TransitionType,
};
pub use variant::{Variant, VariantKey, VariantVec};

/// Zero-cost logging shim (§1 Ambient stack): expands to `log::trace!` when
/// the `logging` feature is enabled, to nothing at all otherwise. Mirrors
/// the teacher's `__fsm_log!` pattern so the dispatch loop's hot path never
/// pays for a disabled logger.
#[cfg(feature = "logging")]
#[macro_export]
#[doc(hidden)]
macro_rules! __hsm_log {
    (trace, $($arg:tt)*) => { log::trace!($($arg)*); };
    (debug, $($arg:tt)*) => { log::debug!($($arg)*); };
    (info, $($arg:tt)*) => { log::info!($($arg)*); };
    (warn, $($arg:tt)*) => { log::warn!($($arg)*); };
    (error, $($arg:tt)*) => { log::error!($($arg)*); };
}

#[cfg(not(feature = "logging"))]
#[macro_export]
#[doc(hidden)]
macro_rules! __hsm_log {
    ($level:tt, $($arg:tt)*) => {};
}
