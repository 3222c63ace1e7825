//! Integration tests for the hierarchical state machine runtime: the
//! literal-ID scenarios from the design doc's testable-properties section.

use hsm_rt::dispatcher::cooperative::CooperativeDispatcher;
use hsm_rt::dispatcher::std_thread::StdThreadDispatcher;
use hsm_rt::{
    EventId, Hsm, HistoryType, StateAction, StateActionTrigger, StateCallbacks, StateId, TimerId,
    Variant,
};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Scenario 1: Simple Toggle
// ============================================================================

#[test]
fn simple_toggle() {
    const OFF: StateId = StateId(0);
    const ON: StateId = StateId(1);
    const SWITCH: EventId = EventId(0);

    let mut hsm = Hsm::new();
    hsm.register_state(OFF, StateCallbacks::new());
    hsm.register_state(ON, StateCallbacks::new());
    hsm.register_transition(OFF, ON, SWITCH, None, None, true);
    hsm.register_transition(ON, OFF, SWITCH, None, None, true);

    let dispatcher = Arc::new(CooperativeDispatcher::new());
    let handle: Arc<dyn hsm_rt::HsmEventDispatcher> = dispatcher.clone();
    assert!(hsm.initialize(handle, OFF));
    assert_eq!(hsm.active_states(), vec![OFF]);

    hsm.transition(SWITCH, Vec::new());
    dispatcher.dispatch_events();
    assert_eq!(hsm.active_states(), vec![ON]);

    hsm.transition(SWITCH, Vec::new());
    dispatcher.dispatch_events();
    assert_eq!(hsm.active_states(), vec![OFF]);
}

// ============================================================================
// Scenario 2: Composite Entry Point
// ============================================================================

#[test]
fn composite_entry_point_then_internal_substate_transition() {
    const A: StateId = StateId(0);
    const B: StateId = StateId(1);
    const C: StateId = StateId(2);
    const P: StateId = StateId(3);
    const E1: EventId = EventId(0);

    let mut hsm = Hsm::new();
    hsm.register_state(A, StateCallbacks::new());
    hsm.register_state(B, StateCallbacks::new());
    hsm.register_state(C, StateCallbacks::new());
    hsm.register_state(P, StateCallbacks::new());
    assert!(hsm.register_substate_entry_point(P, B, None, None, true));
    assert!(hsm.register_substate(P, C));
    assert!(hsm.register_transition(A, P, E1, None, None, true));
    assert!(hsm.register_transition(B, C, E1, None, None, true));

    let dispatcher = Arc::new(CooperativeDispatcher::new());
    let handle: Arc<dyn hsm_rt::HsmEventDispatcher> = dispatcher.clone();
    assert!(hsm.initialize(handle, A));

    hsm.transition(E1, Vec::new());
    dispatcher.dispatch_events();
    assert_eq!(hsm.active_states(), vec![P, B]);

    hsm.transition(E1, Vec::new());
    dispatcher.dispatch_events();
    assert_eq!(hsm.active_states(), vec![P, C]);
}

// ============================================================================
// Scenario 3: Conditional Entry Points
// ============================================================================

#[test]
fn conditional_entry_points_select_by_triggering_event() {
    const A: StateId = StateId(0);
    const B: StateId = StateId(1);
    const C: StateId = StateId(2);
    const P: StateId = StateId(3);
    const E1: EventId = EventId(0);
    const E2: EventId = EventId(1);

    let mut hsm = Hsm::new();
    hsm.register_state(A, StateCallbacks::new());
    hsm.register_state(B, StateCallbacks::new());
    hsm.register_state(C, StateCallbacks::new());
    hsm.register_state(P, StateCallbacks::new());
    assert!(hsm.register_substate_entry_point(P, B, Some(E1), None, true));
    assert!(hsm.register_substate_entry_point(P, C, Some(E2), None, true));
    assert!(hsm.register_transition(A, P, E1, None, None, true));
    assert!(hsm.register_transition(A, P, E2, None, None, true));

    let dispatcher = Arc::new(CooperativeDispatcher::new());
    let handle: Arc<dyn hsm_rt::HsmEventDispatcher> = dispatcher.clone();
    assert!(hsm.initialize(handle, A));

    hsm.transition(E2, Vec::new());
    dispatcher.dispatch_events();
    assert_eq!(hsm.active_states(), vec![P, C]);
}

// ============================================================================
// Scenario 4: Shallow History
// ============================================================================

#[test]
fn shallow_history_restores_last_active_child() {
    const ROOT: StateId = StateId(0);
    const P: StateId = StateId(1);
    const A: StateId = StateId(2);
    const B: StateId = StateId(3);
    const H: StateId = StateId(4);
    const X: StateId = StateId(5);
    const E1: EventId = EventId(0);
    const E2: EventId = EventId(1);
    const E3: EventId = EventId(2);

    let mut hsm = Hsm::new();
    hsm.register_state(ROOT, StateCallbacks::new());
    hsm.register_state(P, StateCallbacks::new());
    hsm.register_state(A, StateCallbacks::new());
    hsm.register_state(B, StateCallbacks::new());
    hsm.register_state(X, StateCallbacks::new());
    assert!(hsm.register_substate_entry_point(P, A, None, None, true));
    assert!(hsm.register_substate(P, B));
    assert!(hsm.register_history(P, H, HistoryType::Shallow, StateId::INVALID, None));
    assert!(hsm.register_transition(ROOT, P, E1, None, None, true));
    assert!(hsm.register_transition(A, B, E1, None, None, true));
    assert!(hsm.register_transition(P, X, E2, None, None, true));
    assert!(hsm.register_transition(X, H, E3, None, None, true));

    let dispatcher = Arc::new(CooperativeDispatcher::new());
    let handle: Arc<dyn hsm_rt::HsmEventDispatcher> = dispatcher.clone();
    assert!(hsm.initialize(handle, ROOT));

    for event in [E1, E1, E2, E3] {
        hsm.transition(event, Vec::new());
        dispatcher.dispatch_events();
    }
    assert_eq!(hsm.active_states(), vec![P, B]);
}

// ============================================================================
// Scenario 5: Guard Veto
// ============================================================================

#[test]
fn guard_veto_leaves_active_states_unchanged_and_fires_failed_callback() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const A: StateId = StateId(0);
    const B: StateId = StateId(1);
    const E1: EventId = EventId(0);

    let mut hsm = Hsm::new();
    hsm.register_state(A, StateCallbacks::new());
    hsm.register_state(B, StateCallbacks::new());
    let guard: hsm_rt::GuardCallback =
        Box::new(|args| args.first().map(|v| v.to_string()) == Some("go".to_string()));
    assert!(hsm.register_transition(A, B, E1, None, Some(guard), true));

    let calls = Arc::new(AtomicUsize::new(0));
    let seen_args = Arc::new(Mutex::new(Vec::new()));
    let calls2 = calls.clone();
    let seen_args2 = seen_args.clone();
    hsm.register_failed_transition_callback(Box::new(move |_active, event, args| {
        calls2.fetch_add(1, Ordering::SeqCst);
        *seen_args2.lock().unwrap() = args.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        assert_eq!(event, E1);
    }));

    let dispatcher = Arc::new(CooperativeDispatcher::new());
    let handle: Arc<dyn hsm_rt::HsmEventDispatcher> = dispatcher.clone();
    assert!(hsm.initialize(handle, A));

    hsm.transition(E1, vec![Variant::from("stop")]);
    dispatcher.dispatch_events();

    assert_eq!(hsm.active_states(), vec![A]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(seen_args.lock().unwrap().as_slice(), ["stop".to_string()]);
}

// ============================================================================
// Scenario 6: Timer-Driven Transition
// ============================================================================

#[test]
fn timer_bound_to_event_drives_transition_after_single_shot_fires() {
    const A: StateId = StateId(0);
    const B: StateId = StateId(1);
    const C: StateId = StateId(2);
    const E1: EventId = EventId(0);
    const E2: EventId = EventId(1);
    const T1: TimerId = TimerId(0);

    let mut hsm = Hsm::new();
    hsm.register_state(A, StateCallbacks::new());
    hsm.register_state(B, StateCallbacks::new());
    hsm.register_state(C, StateCallbacks::new());
    assert!(hsm.register_timer(T1, E2));
    assert!(hsm.register_state_action(
        B,
        StateActionTrigger::OnEntry,
        StateAction::StartTimer {
            timer: T1,
            interval_ms: 100,
            single_shot: true,
        },
    ));
    assert!(hsm.register_transition(A, B, E1, None, None, true));
    assert!(hsm.register_transition(B, C, E2, None, None, true));

    let dispatcher = Arc::new(StdThreadDispatcher::new());
    let handle: Arc<dyn hsm_rt::HsmEventDispatcher> = dispatcher.clone();
    assert!(hsm.initialize(handle, A));

    assert!(hsm.transition(E1, Vec::new()));
    std::thread::sleep(Duration::from_millis(150));

    assert_eq!(hsm.active_states(), vec![C]);
    assert!(!hsm.is_timer_running(T1));
}
