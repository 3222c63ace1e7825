//! # Concurrent ISR Example
//!
//! Demonstrates the `concurrent`-feature [`IsrDispatcher`] with a sensor
//! monitoring machine driven from two simulated interrupt sources: a
//! periodic timer ISR and a data-ready ISR. Both post through
//! [`Hsm::transition_interrupt_safe`], which only ever touches the
//! dispatcher's bounded, allocation-free queue - the same call an actual
//! ISR handler on a microcontroller would make.
//!
//! Run with: `cargo run --example concurrent_isr --features concurrent`

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hsm_rt::dispatcher::isr::IsrDispatcher;
use hsm_rt::{EventId, Hsm, HsmEventDispatcher, StateCallbacks, StateId, TransitionType};

const IDLE: StateId = StateId(0);
const MONITORING: StateId = StateId(1);
const ERROR: StateId = StateId(2);

const START: EventId = EventId(0);
const STOP: EventId = EventId(1);
const TIMER_TICK: EventId = EventId(2);
const DATA_READY: EventId = EventId(3);
const OUT_OF_RANGE: EventId = EventId(4);

static ISR_ENABLED: AtomicBool = AtomicBool::new(false);
static SENSOR_VALUE: AtomicU32 = AtomicU32::new(0);
static SAMPLE_COUNT: AtomicU32 = AtomicU32::new(0);

/// Simulates a periodic timer interrupt by spawning a thread that calls
/// `transition_interrupt_safe` on a cadence. A real embedded target would
/// call this straight from an ISR instead.
fn simulated_timer_isr(hsm: Arc<Hsm>) {
    thread::spawn(move || loop {
        thread::sleep(Duration::from_millis(100));
        if ISR_ENABLED.load(Ordering::Relaxed) {
            println!("  [ISR:Timer] firing TIMER_TICK");
            hsm.transition_interrupt_safe(TIMER_TICK);
        }
    });
}

/// Simulates a data-ready interrupt (e.g. an ADC conversion-complete line).
fn simulated_data_isr(hsm: Arc<Hsm>) {
    thread::spawn(move || {
        let mut counter = 0u32;
        loop {
            thread::sleep(Duration::from_millis(250));
            if ISR_ENABLED.load(Ordering::Relaxed) {
                counter += 1;
                let value = (counter * 137) % 1200;
                SENSOR_VALUE.store(value, Ordering::Relaxed);
                println!("  [ISR:Data] data ready, value={value}");
                if value > 1000 {
                    hsm.transition_interrupt_safe(OUT_OF_RANGE);
                } else {
                    hsm.transition_interrupt_safe(DATA_READY);
                }
            }
        }
    });
}

fn main() {
    let mut hsm = Hsm::new();

    hsm.register_state(IDLE, StateCallbacks::new().with_on_state(Box::new(|_| {
        SAMPLE_COUNT.store(0, Ordering::Relaxed);
        println!("[Idle] sensor monitoring stopped");
    })));
    hsm.register_state(MONITORING, StateCallbacks::new().with_on_state(Box::new(|_| println!("[Monitoring] active"))));
    hsm.register_state(ERROR, StateCallbacks::new().with_on_state(Box::new(|_| println!("[Error] value out of range"))));

    hsm.register_transition(IDLE, MONITORING, START, None, None, true);
    // Internal self-transitions: sampling never exits/re-enters Monitoring,
    // it just reacts in place (§3 "internal self-transitions do not
    // exit/re-enter the state").
    hsm.register_self_transition(
        MONITORING,
        TIMER_TICK,
        TransitionType::Internal,
        Some(Box::new(|_| {
            let n = SAMPLE_COUNT.fetch_add(1, Ordering::Relaxed) + 1;
            println!("[Monitoring] sample #{n}");
        })),
        None,
        true,
    );
    hsm.register_self_transition(
        MONITORING,
        DATA_READY,
        TransitionType::Internal,
        Some(Box::new(|_| println!("[Monitoring] value={}", SENSOR_VALUE.load(Ordering::Relaxed)))),
        None,
        true,
    );
    hsm.register_transition(MONITORING, ERROR, OUT_OF_RANGE, None, None, true);
    hsm.register_transition(MONITORING, IDLE, STOP, None, None, true);
    hsm.register_transition(ERROR, MONITORING, START, None, None, true);
    hsm.register_transition(ERROR, IDLE, STOP, None, None, true);

    let dispatcher: Arc<IsrDispatcher> = Arc::new(IsrDispatcher::new());
    let boundary: Arc<dyn HsmEventDispatcher> = dispatcher.clone();
    assert!(hsm.initialize(boundary, IDLE));
    let hsm = Arc::new(hsm);

    // The host's own loop, not a background thread the dispatcher owns
    // (§4.3(c)): drive it from a plain thread here to keep the example
    // runnable, but on real hardware this would be the scheduler task
    // draining the queue an ISR fed.
    let pump_dispatcher = dispatcher.clone();
    let stop_pump = Arc::new(AtomicBool::new(false));
    let stop_pump2 = stop_pump.clone();
    let pump = thread::spawn(move || {
        while !stop_pump2.load(Ordering::Relaxed) {
            pump_dispatcher.dispatch_events();
            thread::sleep(Duration::from_millis(10));
        }
    });

    simulated_timer_isr(hsm.clone());
    simulated_data_isr(hsm.clone());
    thread::sleep(Duration::from_millis(50));

    println!("\n[Main] starting sensor\n");
    hsm.transition(START, Vec::new());

    ISR_ENABLED.store(true, Ordering::Relaxed);
    thread::sleep(Duration::from_secs(2));
    ISR_ENABLED.store(false, Ordering::Relaxed);

    println!("\n[Main] stopping sensor");
    hsm.transition(STOP, Vec::new());
    thread::sleep(Duration::from_millis(100));

    stop_pump.store(true, Ordering::Relaxed);
    let _ = pump.join();

    println!(
        "\ndropped events on the ISR-safe queue: {}",
        dispatcher.dropped_events_count()
    );
    println!("final active states: {:?}", hsm.active_states());
}
