//! Opaque identifier types and the small enums that describe the static topology.
//!
//! Ids are plain newtyped integers (see the design notes on why: no internal
//! index is ever exposed to application code, and a `StateId` constructed by
//! the application is never reinterpreted as anything but an opaque key into
//! the [`crate::store::StructureStore`]).

use core::fmt;

/// Sentinel used by every id type's `INVALID` constant.
const INVALID_RAW: i32 = -1000;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub i32);

        impl $name {
            /// Sentinel "invalid" value for this id type.
            pub const INVALID: Self = Self(INVALID_RAW);

            /// `true` for every value except [`Self::INVALID`].
            pub fn is_valid(self) -> bool {
                self != Self::INVALID
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i32> for $name {
            fn from(v: i32) -> Self {
                Self(v)
            }
        }
    };
}

opaque_id!(
    /// Identifies a state (regular, final, or history) in the structure store.
    StateId
);
opaque_id!(
    /// Identifies an event understood by the engine.
    EventId
);
opaque_id!(
    /// Identifies a timer binding.
    TimerId
);
opaque_id!(
    /// Identifies a registered dispatcher event or timer handler.
    HandlerId
);

/// The two flavors of history pseudo-state (see §3 of the design doc).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryType {
    /// Remembers only the direct child of the parent that was active.
    Shallow,
    /// Remembers the full set of active descendants.
    Deep,
}

/// How a transition behaves when `from == to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionType {
    /// Does not run `on_exiting`/`on_entering`; the state is never left.
    Internal,
    /// Runs the full exit/entry lifecycle even though source and destination
    /// are the same state.
    External,
}

/// Internal classification of a transition record, used by the dispatch loop
/// to decide ordering (internal self-transitions run before external ones).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransitionKind {
    External,
    Internal,
    EntryPoint,
}

/// When a state action fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateActionTrigger {
    OnEntry,
    OnExit,
}

/// A state action bound to a trigger, executed by the engine in-line with
/// the exit/entry phases of the transition (§4.4.1 steps c and g).
#[derive(Debug, Clone, PartialEq)]
pub enum StateAction {
    StartTimer {
        timer: TimerId,
        interval_ms: u32,
        single_shot: bool,
    },
    StopTimer {
        timer: TimerId,
    },
    RestartTimer {
        timer: TimerId,
    },
    Transition {
        event: EventId,
    },
}

/// Outcome delivered to a synchronous waiter (or observed by a completion
/// handle) once a posted event has finished processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionStatus {
    /// At least one candidate transition executed successfully.
    DoneOk,
    /// No candidate transition executed (no match, guard rejected, or vetoed).
    DoneFailed,
    /// The event was discarded by `release()` or queue-clearing before being
    /// fully processed.
    Canceled,
}
