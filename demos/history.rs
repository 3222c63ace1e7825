//! # History Example: Audio Player with Resumable Volume Mode
//!
//! Models a media player (§8 scenario 4's shallow-history round trip,
//! dressed up as a real use case): `Playing` is a composite with two
//! substates, `Normal` and `Boosted` volume, plus a shallow history
//! pseudo-state. Stopping playback and resuming later re-enters whichever
//! volume mode was active when playback stopped, instead of always
//! resetting to `Normal`.
//!
//! Run with: `cargo run --example history`

use std::sync::Arc;

use hsm_rt::dispatcher::cooperative::CooperativeDispatcher;
use hsm_rt::{EventId, HistoryType, Hsm, HsmEventDispatcher, StateCallbacks, StateId};

const STOPPED: StateId = StateId(0);
const PLAYING: StateId = StateId(1);
const NORMAL: StateId = StateId(2);
const BOOSTED: StateId = StateId(3);
const RESUME_HISTORY: StateId = StateId(4);

const PLAY: EventId = EventId(0);
const BOOST: EventId = EventId(1);
const STOP: EventId = EventId(2);
const RESUME: EventId = EventId(3);

fn main() {
    let mut hsm = Hsm::new();

    hsm.register_state(STOPPED, StateCallbacks::new().with_on_state(Box::new(|_| println!("player: stopped"))));
    hsm.register_state(PLAYING, StateCallbacks::new());
    hsm.register_state(NORMAL, StateCallbacks::new().with_on_state(Box::new(|_| println!("player: playing (normal volume)"))));
    hsm.register_state(BOOSTED, StateCallbacks::new().with_on_state(Box::new(|_| println!("player: playing (boosted volume)"))));

    hsm.register_substate_entry_point(PLAYING, NORMAL, None, None, true);
    hsm.register_substate(PLAYING, BOOSTED);
    hsm.register_history(PLAYING, RESUME_HISTORY, HistoryType::Shallow, StateId::INVALID, None);

    hsm.register_transition(STOPPED, PLAYING, PLAY, None, None, true);
    hsm.register_transition(NORMAL, BOOSTED, BOOST, None, None, true);
    hsm.register_transition(PLAYING, STOPPED, STOP, None, None, true);
    hsm.register_transition(STOPPED, RESUME_HISTORY, RESUME, None, None, true);

    let dispatcher = Arc::new(CooperativeDispatcher::new());
    let boundary: Arc<dyn HsmEventDispatcher> = dispatcher.clone();
    assert!(hsm.initialize(boundary, STOPPED));

    for (label, event) in [
        ("play", PLAY),
        ("boost volume", BOOST),
        ("stop", STOP),
        ("resume", RESUME),
    ] {
        println!("-- {label} --");
        hsm.transition(event, Vec::new());
        dispatcher.dispatch_events();
    }

    // Resuming restored Boosted, not Normal, because Boosted was the active
    // child of Playing when Stop fired.
    assert!(hsm.is_state_active(BOOSTED));
    println!("\nactive states: {:?}", hsm.active_states());
}
