//! # Traffic Light Example
//!
//! The canonical toggle-style state machine, scaled up to three states
//! that cycle on their own: `Red -> Green -> Yellow -> Red`. Each state
//! starts a single-shot timer on entry; the timer's bound event is what
//! drives the machine to the next state, so once started the light runs
//! unattended off the [`StdThreadDispatcher`]'s own worker thread.
//!
//! Run with: `cargo run --example trafficlight`

use std::sync::Arc;
use std::time::Duration;

use hsm_rt::dispatcher::std_thread::StdThreadDispatcher;
use hsm_rt::{EventId, Hsm, HsmEventDispatcher, StateAction, StateActionTrigger, StateCallbacks, StateId, TimerId};

const RED: StateId = StateId(0);
const GREEN: StateId = StateId(1);
const YELLOW: StateId = StateId(2);

const TICK: EventId = EventId(0);
const TIMER: TimerId = TimerId(0);

fn announce(name: &'static str) -> hsm_rt::StateChangedCallback {
    Box::new(move |_args| println!("light: {name}"))
}

fn main() {
    let mut hsm = Hsm::new();

    hsm.register_state(RED, StateCallbacks::new().with_on_state(announce("RED")));
    hsm.register_state(GREEN, StateCallbacks::new().with_on_state(announce("GREEN")));
    hsm.register_state(YELLOW, StateCallbacks::new().with_on_state(announce("YELLOW")));

    hsm.register_timer(TIMER, TICK);
    for (state, hold_ms) in [(RED, 1500), (GREEN, 1200), (YELLOW, 500)] {
        hsm.register_state_action(
            state,
            StateActionTrigger::OnEntry,
            StateAction::StartTimer {
                timer: TIMER,
                interval_ms: hold_ms,
                single_shot: true,
            },
        );
    }

    hsm.register_transition(RED, GREEN, TICK, None, None, true);
    hsm.register_transition(GREEN, YELLOW, TICK, None, None, true);
    hsm.register_transition(YELLOW, RED, TICK, None, None, true);

    let dispatcher = Arc::new(StdThreadDispatcher::new());
    let boundary: Arc<dyn HsmEventDispatcher> = dispatcher.clone();
    assert!(hsm.initialize(boundary, RED));

    // Let two full cycles run off the timer-driven transitions alone.
    std::thread::sleep(Duration::from_millis(6400));

    hsm.release();
}
