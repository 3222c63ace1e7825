//! # Timers Example: Timeout-Driven Transitions
//!
//! §8 scenario 6, as a connection-handshake timeout: `Connecting` starts a
//! single-shot timer on entry; if the matching event hasn't arrived by the
//! time it fires, the machine falls through to `TimedOut` on its own. A
//! `HandshakeAck` posted before the timer fires instead takes it to
//! `Connected`, demonstrating that `stop_timer`/state actions race exactly
//! the way an application expects.
//!
//! Run with: `cargo run --example timers`

use std::sync::Arc;
use std::time::Duration;

use hsm_rt::dispatcher::std_thread::StdThreadDispatcher;
use hsm_rt::{EventId, Hsm, HsmEventDispatcher, StateAction, StateActionTrigger, StateCallbacks, StateId, TimerId};

const IDLE: StateId = StateId(0);
const CONNECTING: StateId = StateId(1);
const CONNECTED: StateId = StateId(2);
const TIMED_OUT: StateId = StateId(3);

const CONNECT: EventId = EventId(0);
const HANDSHAKE_ACK: EventId = EventId(1);
const TIMEOUT: EventId = EventId(2);

const HANDSHAKE_TIMER: TimerId = TimerId(0);

fn main() {
    let mut hsm = Hsm::new();

    hsm.register_state(IDLE, StateCallbacks::new());
    hsm.register_state(CONNECTING, StateCallbacks::new().with_on_state(Box::new(|_| println!("connecting: waiting up to 150ms for handshake"))));
    hsm.register_state(CONNECTED, StateCallbacks::new().with_on_state(Box::new(|_| println!("connected"))));
    hsm.register_state(TIMED_OUT, StateCallbacks::new().with_on_state(Box::new(|_| println!("timed out waiting for handshake"))));

    hsm.register_timer(HANDSHAKE_TIMER, TIMEOUT);
    hsm.register_state_action(
        CONNECTING,
        StateActionTrigger::OnEntry,
        StateAction::StartTimer {
            timer: HANDSHAKE_TIMER,
            interval_ms: 150,
            single_shot: true,
        },
    );
    // Stopping the timer on exit means a handshake that lands just before
    // the deadline never races a stale TIMEOUT event in afterward.
    hsm.register_state_action(CONNECTING, StateActionTrigger::OnExit, StateAction::StopTimer { timer: HANDSHAKE_TIMER });

    hsm.register_transition(IDLE, CONNECTING, CONNECT, None, None, true);
    hsm.register_transition(CONNECTING, CONNECTED, HANDSHAKE_ACK, None, None, true);
    hsm.register_transition(CONNECTING, TIMED_OUT, TIMEOUT, None, None, true);

    let dispatcher = Arc::new(StdThreadDispatcher::new());
    let boundary: Arc<dyn HsmEventDispatcher> = dispatcher.clone();
    assert!(hsm.initialize(boundary, IDLE));

    println!("-- run 1: handshake never arrives --");
    hsm.transition(CONNECT, Vec::new());
    std::thread::sleep(Duration::from_millis(250));
    assert!(hsm.is_state_active(TIMED_OUT));
    assert!(!hsm.is_timer_running(HANDSHAKE_TIMER));
    println!("active states: {:?}\n", hsm.active_states());

    hsm.release();

    // Second run, fresh machine: handshake arrives before the timeout fires.
    let mut hsm2 = Hsm::new();
    hsm2.register_state(IDLE, StateCallbacks::new());
    hsm2.register_state(CONNECTING, StateCallbacks::new());
    hsm2.register_state(CONNECTED, StateCallbacks::new().with_on_state(Box::new(|_| println!("connected"))));
    hsm2.register_state(TIMED_OUT, StateCallbacks::new());
    hsm2.register_timer(HANDSHAKE_TIMER, TIMEOUT);
    hsm2.register_state_action(
        CONNECTING,
        StateActionTrigger::OnEntry,
        StateAction::StartTimer {
            timer: HANDSHAKE_TIMER,
            interval_ms: 150,
            single_shot: true,
        },
    );
    hsm2.register_state_action(CONNECTING, StateActionTrigger::OnExit, StateAction::StopTimer { timer: HANDSHAKE_TIMER });
    hsm2.register_transition(IDLE, CONNECTING, CONNECT, None, None, true);
    hsm2.register_transition(CONNECTING, CONNECTED, HANDSHAKE_ACK, None, None, true);
    hsm2.register_transition(CONNECTING, TIMED_OUT, TIMEOUT, None, None, true);

    let dispatcher2 = Arc::new(StdThreadDispatcher::new());
    let boundary2: Arc<dyn HsmEventDispatcher> = dispatcher2.clone();
    assert!(hsm2.initialize(boundary2, IDLE));

    println!("-- run 2: handshake arrives in time --");
    hsm2.transition(CONNECT, Vec::new());
    std::thread::sleep(Duration::from_millis(30));
    hsm2.transition(HANDSHAKE_ACK, Vec::new());
    std::thread::sleep(Duration::from_millis(250));
    assert!(hsm2.is_state_active(CONNECTED));
    assert!(!hsm2.is_timer_running(HANDSHAKE_TIMER));
    println!("active states: {:?}", hsm2.active_states());

    hsm2.release();
}
