//! Callback type aliases.
//!
//! §9 calls for "callbacks as values, not virtual methods": every callback is
//! an owned boxed closure stored directly on the state/transition/history
//! record in the [`crate::store::StructureStore`], rather than an
//! overridable method on a base class.

use crate::types::{EventId, StateId};
use crate::variant::VariantVec;

/// Runs when a transition fires; cannot veto.
pub type TransitionCallback = Box<dyn Fn(&VariantVec) + Send + Sync>;

/// Evaluates a guard against the event args; the transition is taken only
/// when the return value equals the guard's configured expected value.
pub type GuardCallback = Box<dyn Fn(&VariantVec) -> bool + Send + Sync>;

/// Fires before a state is entered. Returning `false` vetoes the transition.
pub type StateEnterCallback = Box<dyn Fn(&VariantVec) -> bool + Send + Sync>;

/// Fires before a state is exited. Returning `false` vetoes the transition.
pub type StateExitCallback = Box<dyn Fn() -> bool + Send + Sync>;

/// Fires after a state has been entered and the active-state set updated.
pub type StateChangedCallback = Box<dyn Fn(&VariantVec) + Send + Sync>;

/// Fires when history is restored for a parent composite.
pub type HistoryCallback = Box<dyn Fn(&[StateId]) + Send + Sync>;

/// Fires whenever a posted event yields no successful transition anywhere
/// in the active-state set.
pub type FailedTransitionCallback = Box<dyn Fn(&[StateId], EventId, &VariantVec) + Send + Sync>;

/// Bundle of lifecycle callbacks attached to a regular or final state.
/// Each field is independently optional; a state with `None` everywhere is
/// just a plain node in the hierarchy.
#[derive(Default)]
pub struct StateCallbacks {
    pub on_entering: Option<StateEnterCallback>,
    pub on_exiting: Option<StateExitCallback>,
    pub on_state: Option<StateChangedCallback>,
}

impl StateCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_on_entering(mut self, cb: StateEnterCallback) -> Self {
        self.on_entering = Some(cb);
        self
    }

    pub fn with_on_exiting(mut self, cb: StateExitCallback) -> Self {
        self.on_exiting = Some(cb);
        self
    }

    pub fn with_on_state(mut self, cb: StateChangedCallback) -> Self {
        self.on_state = Some(cb);
        self
    }
}
