//! Execution Engine (C4): the dispatch loop, transition algorithm, history
//! and entry-point resolution, and the public API surface applications use
//! (§4.4).

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::callbacks::FailedTransitionCallback;
use crate::debug_log::{ActionKind, DebugLog, DebugLogSink};
use crate::dispatcher::HsmEventDispatcher;
use crate::queue::{EventQueue, PendingEvent};
use crate::store::{StructureStore, TransitionRecord};
use crate::types::{EventId, HandlerId, HistoryType, StateActionTrigger, StateId, TimerId, TransitionStatus};
use crate::variant::VariantVec;

type HistorySavedSets = HashMap<StateId, Vec<StateId>>;

/// Shared, read-only-after-`initialize` engine state. Cloned into every
/// callback the dispatcher holds so the handler closures can outlive the
/// call to `initialize` that created them.
struct EngineShared {
    store: StructureStore,
    queue: EventQueue,
    active_states: Mutex<Vec<StateId>>,
    history_saved: Mutex<HistorySavedSets>,
    failed_callback: Mutex<Option<FailedTransitionCallback>>,
    debug_log: DebugLog,
    dispatcher: Arc<dyn HsmEventDispatcher>,
    handler_id: Mutex<HandlerId>,
    timer_handler_id: Mutex<HandlerId>,
}

/// The hierarchical state machine engine. Build the topology with the
/// `register_*` methods, then call [`Hsm::initialize`] to bind a dispatcher
/// and start processing events.
pub struct Hsm {
    store: StructureStore,
    shared: Option<Arc<EngineShared>>,
    pending_failed_callback: Option<FailedTransitionCallback>,
}

impl Default for Hsm {
    fn default() -> Self {
        Self::new()
    }
}

impl Hsm {
    pub fn new() -> Self {
        Self {
            store: StructureStore::new(),
            shared: None,
            pending_failed_callback: None,
        }
    }

    fn is_initialized(&self) -> bool {
        self.shared.is_some()
    }

    // ------------------------------------------------------- C1 delegation

    pub fn register_state(&mut self, id: StateId, callbacks: crate::callbacks::StateCallbacks) -> bool {
        !self.is_initialized() && self.store.register_state(id, callbacks)
    }

    pub fn register_final_state(
        &mut self,
        id: StateId,
        exit_event: Option<EventId>,
        callbacks: crate::callbacks::StateCallbacks,
    ) -> bool {
        !self.is_initialized() && self.store.register_final_state(id, exit_event, callbacks)
    }

    pub fn register_substate(&mut self, parent: StateId, child: StateId) -> bool {
        !self.is_initialized() && self.store.register_substate(parent, child)
    }

    pub fn register_substate_entry_point(
        &mut self,
        parent: StateId,
        child: StateId,
        event_filter: Option<EventId>,
        guard: Option<crate::callbacks::GuardCallback>,
        expected: bool,
    ) -> bool {
        !self.is_initialized()
            && self
                .store
                .register_substate_entry_point(parent, child, event_filter, guard, expected)
    }

    pub fn register_transition(
        &mut self,
        from: StateId,
        to: StateId,
        event: EventId,
        callback: Option<crate::callbacks::TransitionCallback>,
        guard: Option<crate::callbacks::GuardCallback>,
        expected: bool,
    ) -> bool {
        !self.is_initialized() && self.store.register_transition(from, to, event, callback, guard, expected)
    }

    pub fn register_self_transition(
        &mut self,
        state: StateId,
        event: EventId,
        kind: crate::types::TransitionType,
        callback: Option<crate::callbacks::TransitionCallback>,
        guard: Option<crate::callbacks::GuardCallback>,
        expected: bool,
    ) -> bool {
        !self.is_initialized() && self.store.register_self_transition(state, event, kind, callback, guard, expected)
    }

    pub fn register_history(
        &mut self,
        parent: StateId,
        history_state: StateId,
        history_type: HistoryType,
        default_target: StateId,
        callback: Option<crate::callbacks::HistoryCallback>,
    ) -> bool {
        !self.is_initialized()
            && self
                .store
                .register_history(parent, history_state, history_type, default_target, callback)
    }

    pub fn register_timer(&mut self, timer: TimerId, event: EventId) -> bool {
        !self.is_initialized() && self.store.register_timer(timer, event)
    }

    pub fn register_state_action(
        &mut self,
        state: StateId,
        trigger: StateActionTrigger,
        action: crate::types::StateAction,
    ) -> bool {
        !self.is_initialized() && self.store.register_state_action(state, trigger, action)
    }

    pub fn register_failed_transition_callback(&mut self, f: FailedTransitionCallback) {
        match &self.shared {
            Some(shared) => *shared.failed_callback.lock().unwrap_or_else(|e| e.into_inner()) = Some(f),
            None => self.pending_failed_callback = Some(f),
        }
    }

    // ------------------------------------------------------------- lifecycle

    /// Binds `dispatcher`, registers the engine's handlers with it, seeds
    /// the active-state set from `initial_state` (descending through entry
    /// points), and starts dispatching. Returns `false` on structural
    /// failure (e.g. an unresolved entry point) without mutating anything
    /// observable.
    pub fn initialize(&mut self, dispatcher: Arc<dyn HsmEventDispatcher>, initial_state: StateId) -> bool {
        if self.is_initialized() {
            return false;
        }

        let empty_history = HistorySavedSets::new();
        let mut entered_order = Vec::new();
        let no_args = VariantVec::new();
        let Some(_) = resolve_destination(
            &self.store,
            &empty_history,
            initial_state,
            EventId::INVALID,
            &no_args,
            &mut entered_order,
        ) else {
            return false;
        };

        for &s in &entered_order {
            if let Some(cb) = self.store.callbacks(s).and_then(|c| c.on_entering.as_ref()) {
                if !cb(&no_args) {
                    return false;
                }
            }
        }

        crate::__hsm_log!(info, "hsm: initializing, initial_state={:?}", initial_state);

        let store = std::mem::take(&mut self.store);
        let shared = Arc::new(EngineShared {
            store,
            queue: EventQueue::new(),
            active_states: Mutex::new(entered_order.clone()),
            history_saved: Mutex::new(HistorySavedSets::new()),
            failed_callback: Mutex::new(self.pending_failed_callback.take()),
            debug_log: DebugLog::new(),
            dispatcher: dispatcher.clone(),
            handler_id: Mutex::new(HandlerId::INVALID),
            timer_handler_id: Mutex::new(HandlerId::INVALID),
        });

        let for_events = shared.clone();
        let handler_id = dispatcher.register_event_handler(Box::new(move || {
            Self::process_queue(&for_events);
        }));
        *shared.handler_id.lock().unwrap_or_else(|e| e.into_inner()) = handler_id;

        let for_timers = shared.clone();
        let timer_handler_id = dispatcher.register_timer_handler(Box::new(move |timer_id| {
            if let Some(event) = for_timers.store.timer_event(timer_id) {
                for_timers.queue.push_back(PendingEvent::new(event, VariantVec::new()));
                let h = *for_timers.handler_id.lock().unwrap_or_else(|e| e.into_inner());
                for_timers.dispatcher.emit_event(h);
            }
        }));
        *shared.timer_handler_id.lock().unwrap_or_else(|e| e.into_inner()) = timer_handler_id;

        for &s in &entered_order {
            Self::run_state_actions(&shared, s, StateActionTrigger::OnEntry);
            if let Some(cb) = shared.store.callbacks(s).and_then(|c| c.on_state.as_ref()) {
                cb(&no_args);
            }
        }

        dispatcher.start();
        self.shared = Some(shared);
        crate::__hsm_log!(info, "hsm: initialized, active_states={:?}", entered_order);
        true
    }

    /// Idempotent: unregisters handlers, stops every timer bound to them,
    /// cancels all pending events, and clears the active-state set. Safe to
    /// call from the dispatcher's own thread.
    pub fn release(&mut self) -> bool {
        let Some(shared) = self.shared.take() else {
            return true;
        };
        crate::__hsm_log!(info, "hsm: releasing");
        let handler_id = *shared.handler_id.lock().unwrap_or_else(|e| e.into_inner());
        let timer_handler_id = *shared.timer_handler_id.lock().unwrap_or_else(|e| e.into_inner());
        shared.dispatcher.unregister_event_handler(handler_id);
        shared.dispatcher.unregister_timer_handler(timer_handler_id);
        shared.queue.clear_canceling();
        shared.active_states.lock().unwrap_or_else(|e| e.into_inner()).clear();
        true
    }

    // -------------------------------------------------------------- posting

    pub fn transition(&self, event: EventId, args: VariantVec) -> bool {
        let Some(shared) = &self.shared else { return false };
        shared.queue.push_back(PendingEvent::new(event, args));
        let handler = *shared.handler_id.lock().unwrap_or_else(|e| e.into_inner());
        shared.dispatcher.emit_event(handler);
        true
    }

    pub fn transition_sync(&self, event: EventId, timeout_ms: u64, args: VariantVec) -> bool {
        let Some(shared) = &self.shared else { return false };
        let (pending, completion) = PendingEvent::new(event, args).with_completion();
        shared.queue.push_back(pending);
        let handler = *shared.handler_id.lock().unwrap_or_else(|e| e.into_inner());
        shared.dispatcher.emit_event(handler);
        matches!(
            completion.wait_timeout(Duration::from_millis(timeout_ms)),
            Some(TransitionStatus::DoneOk)
        )
    }

    /// Atomically discards every queued event and installs `event` as the
    /// only one left to process.
    pub fn transition_with_queue_clear(&self, event: EventId, args: VariantVec) -> bool {
        let Some(shared) = &self.shared else { return false };
        shared.queue.push_front_clear_others(PendingEvent::new(event, args));
        let handler = *shared.handler_id.lock().unwrap_or_else(|e| e.into_inner());
        shared.dispatcher.emit_event(handler);
        true
    }

    /// Safe to call from an interrupt: goes through the dispatcher's
    /// bounded, non-blocking enqueue path rather than this engine's own
    /// (allocating) event queue.
    pub fn transition_interrupt_safe(&self, event: EventId) -> bool {
        let Some(shared) = &self.shared else { return false };
        let handler = *shared.handler_id.lock().unwrap_or_else(|e| e.into_inner());
        shared.dispatcher.enqueue_event(handler, event)
    }

    pub fn is_transition_possible(&self, event: EventId, args: &VariantVec) -> bool {
        let Some(shared) = &self.shared else { return false };
        let active = shared.active_states.lock().unwrap_or_else(|e| e.into_inner()).clone();
        leaf_states(&shared.store, &active)
            .iter()
            .any(|&s| shared.store.has_any_match(s, event, args))
    }

    pub fn active_states(&self) -> Vec<StateId> {
        match &self.shared {
            Some(shared) => shared.active_states.lock().unwrap_or_else(|e| e.into_inner()).clone(),
            None => Vec::new(),
        }
    }

    pub fn last_active_state(&self) -> Option<StateId> {
        self.active_states().last().copied()
    }

    pub fn is_state_active(&self, state: StateId) -> bool {
        self.active_states().contains(&state)
    }

    // --------------------------------------------------------------- timers

    pub fn start_timer(&self, timer: TimerId, interval_ms: u32, single_shot: bool) -> bool {
        let Some(shared) = &self.shared else { return false };
        let handler = *shared.timer_handler_id.lock().unwrap_or_else(|e| e.into_inner());
        shared.dispatcher.start_timer(handler, timer, interval_ms, single_shot);
        true
    }

    pub fn restart_timer(&self, timer: TimerId) -> bool {
        let Some(shared) = &self.shared else { return false };
        shared.dispatcher.restart_timer(timer);
        true
    }

    pub fn stop_timer(&self, timer: TimerId) -> bool {
        let Some(shared) = &self.shared else { return false };
        shared.dispatcher.stop_timer(timer);
        true
    }

    pub fn is_timer_running(&self, timer: TimerId) -> bool {
        match &self.shared {
            Some(shared) => shared.dispatcher.is_timer_running(timer),
            None => false,
        }
    }

    // ----------------------------------------------------------- debug log

    pub fn enable_hsm_debugging(&self, path: Option<&Path>) -> bool {
        match &self.shared {
            Some(shared) => {
                let ok = shared.debug_log.enable(path).is_ok();
                crate::__hsm_log!(info, "hsm: debug log enabled={}", ok);
                ok
            }
            None => false,
        }
    }

    /// Test/embedding hook: install a sink directly instead of going
    /// through the filesystem.
    pub fn enable_hsm_debugging_with_sink(&self, sink: Box<dyn DebugLogSink>) -> bool {
        match &self.shared {
            Some(shared) => {
                shared.debug_log.enable_with_sink(sink);
                true
            }
            None => false,
        }
    }

    pub fn disable_hsm_debugging(&self) {
        if let Some(shared) = &self.shared {
            shared.debug_log.disable();
        }
    }

    // ----------------------------------------------------------- dispatch

    fn process_queue(shared: &Arc<EngineShared>) {
        while let Some((_, event)) = shared.dispatcher.poll_enqueued() {
            // `EventId::INVALID` is a wake-only signal (`emit_event` forwards
            // to `enqueue_event` with no real event to deliver on dispatchers
            // that share one queue for both); it must never become a pending
            // event of its own or it would show up as a spurious `DoneFailed`.
            if event == EventId::INVALID {
                continue;
            }
            shared.queue.push_back(PendingEvent::new(event, VariantVec::new()));
        }
        if shared.queue.is_empty() && shared.debug_log.is_enabled() {
            shared.debug_log.record(
                ActionKind::Idle,
                StateId::INVALID,
                StateId::INVALID,
                EventId::INVALID,
                false,
                &VariantVec::new(),
            );
        }
        while let Some(pending) = shared.queue.pop_front() {
            Self::process_one(shared, pending);
        }
    }

    fn process_one(shared: &Arc<EngineShared>, pending: PendingEvent) {
        let event = pending.event;
        let args = pending.args.clone();
        crate::__hsm_log!(trace, "hsm: processing event {:?}", event);
        let active = shared.active_states.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let leaves = leaf_states(&shared.store, &active);

        let mut any_success = false;
        let mut internally_handled: Vec<StateId> = Vec::new();

        for &leaf in &leaves {
            let internal_matches = shared.store.internal_self_transitions(leaf, event, &args);
            if !internal_matches.is_empty() {
                internally_handled.push(leaf);
            }
            for record in internal_matches {
                if let Some(cb) = &record.callback {
                    cb(&args);
                }
                any_success = true;
                if shared.debug_log.is_enabled() {
                    shared.debug_log.record(ActionKind::Transition, leaf, leaf, event, false, &args);
                }
            }
        }

        // §4.4.1 step 3: an internal self-transition on a leaf takes
        // priority over an external transition matching the same event,
        // it does not merely run first.
        for &leaf in &leaves {
            if internally_handled.contains(&leaf) {
                continue;
            }
            let Some(found) = shared.store.find_external_match(leaf, event, &args) else {
                continue;
            };
            let from_state = found.declared_on;
            for record in found.records {
                if Self::execute_external_transition(shared, leaf, from_state, record, &args) {
                    any_success = true;
                }
            }
        }

        if any_success {
            pending.finish(TransitionStatus::DoneOk);
        } else {
            crate::__hsm_log!(warn, "hsm: event {:?} had no matching transition", event);
            let snapshot = shared.active_states.lock().unwrap_or_else(|e| e.into_inner()).clone();
            if let Some(cb) = shared.failed_callback.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
                cb(&snapshot, event, &args);
            }
            pending.finish(TransitionStatus::DoneFailed);
        }
    }

    fn execute_external_transition(
        shared: &Arc<EngineShared>,
        active_leaf: StateId,
        from_state: StateId,
        record: &TransitionRecord,
        args: &VariantVec,
    ) -> bool {
        let store = &shared.store;
        let destination = record.to;
        let effective_dest = if store.is_history_state(destination) {
            store.history_owner(destination).unwrap_or(destination)
        } else {
            destination
        };
        let lca = store
            .least_common_ancestor(from_state, effective_dest)
            .unwrap_or(from_state);

        let mut exit_chain = vec![active_leaf];
        let mut cur = active_leaf;
        while cur != from_state {
            match store.parent_of(cur) {
                Some(p) => {
                    exit_chain.push(p);
                    cur = p;
                }
                None => break,
            }
        }

        for &s in &exit_chain {
            let veto = store
                .callbacks(s)
                .and_then(|c| c.on_exiting.as_ref())
                .map(|cb| !cb())
                .unwrap_or(false);
            if shared.debug_log.is_enabled() {
                shared.debug_log.record(ActionKind::CallbackExit, s, destination, record.event, veto, args);
            }
            if veto {
                crate::__hsm_log!(debug, "hsm: transition {:?} -> {:?} vetoed on exit of {:?}", from_state, destination, s);
                return false;
            }
        }

        crate::__hsm_log!(
            debug,
            "hsm: transition {:?} -> {:?} on event {:?}",
            from_state,
            destination,
            record.event
        );

        for &s in &exit_chain {
            Self::run_state_actions(shared, s, StateActionTrigger::OnExit);
        }
        if shared.debug_log.is_enabled() {
            shared
                .debug_log
                .record(ActionKind::OnExitActions, from_state, destination, record.event, false, args);
        }

        if let Some(cb) = &record.callback {
            cb(args);
        }
        if shared.debug_log.is_enabled() {
            shared
                .debug_log
                .record(ActionKind::Transition, from_state, destination, record.event, false, args);
        }

        let static_entry = path_between_exclusive(store, lca, effective_dest);
        let mut entered_order = static_entry;
        let history_saved = shared.history_saved.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let resolved = resolve_destination(store, &history_saved, destination, record.event, args, &mut entered_order);
        if shared.debug_log.is_enabled() {
            shared.debug_log.record(
                ActionKind::TransitionEntrypoint,
                from_state,
                destination,
                record.event,
                resolved.is_none(),
                args,
            );
        }
        let Some(leaves) = resolved else {
            crate::__hsm_log!(warn, "hsm: transition {:?} -> {:?} failed to resolve entry point", from_state, destination);
            return false;
        };

        for &s in &entered_order {
            let veto = store
                .callbacks(s)
                .and_then(|c| c.on_entering.as_ref())
                .map(|cb| !cb(args))
                .unwrap_or(false);
            if shared.debug_log.is_enabled() {
                shared.debug_log.record(ActionKind::CallbackEnter, from_state, s, record.event, veto, args);
            }
            if veto {
                crate::__hsm_log!(debug, "hsm: transition {:?} -> {:?} vetoed on entry of {:?}", from_state, destination, s);
                return false;
            }
        }

        for &s in &entered_order {
            Self::run_state_actions(shared, s, StateActionTrigger::OnEntry);
        }
        if shared.debug_log.is_enabled() {
            shared
                .debug_log
                .record(ActionKind::OnEnterActions, from_state, destination, record.event, false, args);
        }

        {
            let mut active = shared.active_states.lock().unwrap_or_else(|e| e.into_inner());
            active.retain(|s| !exit_chain.contains(s));
            for &s in &entered_order {
                if !active.contains(&s) {
                    active.push(s);
                }
            }
        }

        for &s in &entered_order {
            if let Some(cb) = store.callbacks(s).and_then(|c| c.on_state.as_ref()) {
                cb(args);
            }
            if shared.debug_log.is_enabled() {
                shared.debug_log.record(ActionKind::CallbackState, from_state, s, record.event, false, args);
            }
        }

        Self::update_history(shared, &exit_chain);

        for &leaf in &leaves {
            if let Some(declared) = store.final_exit_event(leaf) {
                let synth_event = declared.unwrap_or(record.event);
                shared.queue.push_front(PendingEvent::synthesized(synth_event, args.clone()));
            }
        }

        true
    }

    fn run_state_actions(shared: &Arc<EngineShared>, state: StateId, trigger: StateActionTrigger) {
        for action in shared.store.state_actions_for(state, trigger) {
            match action {
                crate::types::StateAction::StartTimer {
                    timer,
                    interval_ms,
                    single_shot,
                } => {
                    let handler = *shared.timer_handler_id.lock().unwrap_or_else(|e| e.into_inner());
                    shared.dispatcher.start_timer(handler, *timer, *interval_ms, *single_shot);
                }
                crate::types::StateAction::StopTimer { timer } => shared.dispatcher.stop_timer(*timer),
                crate::types::StateAction::RestartTimer { timer } => shared.dispatcher.restart_timer(*timer),
                crate::types::StateAction::Transition { event } => {
                    shared.queue.push_back(PendingEvent::new(*event, VariantVec::new()));
                    let handler = *shared.handler_id.lock().unwrap_or_else(|e| e.into_inner());
                    shared.dispatcher.emit_event(handler);
                }
            }
        }
    }

    /// §4.4.1 step 6: for every composite ancestor in `exit_chain` that owns
    /// a history pseudo-state, save its exited descendants (deep: the full
    /// chain; shallow: just the direct child).
    fn update_history(shared: &Arc<EngineShared>, exit_chain: &[StateId]) {
        for (i, &p) in exit_chain.iter().enumerate() {
            let Some(hist) = shared.store.history_of(p) else {
                continue;
            };
            if i == 0 {
                continue; // p cannot own history about itself with no descendants exited
            }
            let descendants: Vec<StateId> = exit_chain[..i].iter().rev().copied().collect();
            let saved = match hist.history_type {
                HistoryType::Deep => descendants,
                HistoryType::Shallow => vec![exit_chain[i - 1]],
            };
            shared
                .history_saved
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(p, saved);
        }
    }
}

/// States in `active` with no other member of `active` as their child -
/// the true dispatch origins, as opposed to the composite ancestors
/// `active` also carries for the public active-state query (§3).
fn leaf_states(store: &StructureStore, active: &[StateId]) -> Vec<StateId> {
    active
        .iter()
        .copied()
        .filter(|&s| !active.iter().any(|&other| other != s && store.parent_of(other) == Some(s)))
        .collect()
}

/// States strictly between `ancestor` and `dest` (excluding both),
/// outermost-first.
fn path_between_exclusive(store: &StructureStore, ancestor: StateId, dest: StateId) -> Vec<StateId> {
    if ancestor == dest {
        return Vec::new();
    }
    let mut chain = Vec::new();
    let mut cur = dest;
    loop {
        let Some(p) = store.parent_of(cur) else { break };
        if p == ancestor {
            break;
        }
        chain.push(p);
        cur = p;
    }
    chain.reverse();
    chain
}

/// Descends into `target`: if composite, resolves its entry points
/// (recursively); otherwise `target` itself is the single leaf. Every state
/// visited (composites and the final leaves) is appended to `entered_order`
/// outermost-first. Returns `None` if a composite has no matching entry
/// point (§4.4.2's "the transition into P fails").
fn descend_into(
    store: &StructureStore,
    history_saved: &HistorySavedSets,
    target: StateId,
    event: EventId,
    args: &VariantVec,
    entered_order: &mut Vec<StateId>,
) -> Option<Vec<StateId>> {
    entered_order.push(target);
    if !store.is_composite(target) {
        return Some(vec![target]);
    }
    let children = store.entry_points_for(target, event, args);
    if children.is_empty() {
        return None;
    }
    let mut leaves = Vec::new();
    for child in children {
        leaves.extend(descend_into(store, history_saved, child, event, args, entered_order)?);
    }
    Some(leaves)
}

/// Resolves entry into `parent` via its history pseudo-state: restores the
/// saved descendant chain if one exists, else the default target, else
/// falls back to `parent`'s ordinary entry points (§4.4.2).
fn descend_history(
    store: &StructureStore,
    history_saved: &HistorySavedSets,
    parent: StateId,
    event: EventId,
    args: &VariantVec,
    entered_order: &mut Vec<StateId>,
) -> Option<Vec<StateId>> {
    let hist = store.history_of(parent)?;
    if let Some(saved) = history_saved.get(&parent).filter(|s| !s.is_empty()) {
        if let Some(cb) = &hist.callback {
            cb(saved);
        }
        entered_order.extend(saved.iter().copied());
        return Some(vec![*saved.last().unwrap()]);
    }
    if hist.default_target.is_valid() {
        return descend_into(store, history_saved, hist.default_target, event, args, entered_order);
    }
    let children = store.entry_points_for(parent, event, args);
    if children.is_empty() {
        return None;
    }
    let mut leaves = Vec::new();
    for child in children {
        leaves.extend(descend_into(store, history_saved, child, event, args, entered_order)?);
    }
    Some(leaves)
}

/// Top-level entry resolution for a transition's (possibly pseudo-state)
/// destination.
fn resolve_destination(
    store: &StructureStore,
    history_saved: &HistorySavedSets,
    destination: StateId,
    event: EventId,
    args: &VariantVec,
    entered_order: &mut Vec<StateId>,
) -> Option<Vec<StateId>> {
    if store.is_history_state(destination) {
        let parent = store.history_owner(destination)?;
        entered_order.push(parent);
        descend_history(store, history_saved, parent, event, args, entered_order)
    } else {
        descend_into(store, history_saved, destination, event, args, entered_order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::StateCallbacks;
    use crate::dispatcher::cooperative::CooperativeDispatcher;
    use crate::types::TransitionType;
    use std::sync::atomic::{AtomicBool, Ordering};

    const OFF: StateId = StateId(0);
    const ON: StateId = StateId(1);
    const SWITCH: EventId = EventId(0);

    #[test]
    fn simple_toggle() {
        let mut hsm = Hsm::new();
        hsm.register_state(OFF, StateCallbacks::new());
        hsm.register_state(ON, StateCallbacks::new());
        hsm.register_transition(OFF, ON, SWITCH, None, None, true);
        hsm.register_transition(ON, OFF, SWITCH, None, None, true);

        let concrete = Arc::new(CooperativeDispatcher::new());
        let dispatcher: Arc<dyn HsmEventDispatcher> = concrete.clone();
        assert!(hsm.initialize(dispatcher, OFF));
        assert_eq!(hsm.active_states(), vec![OFF]);

        assert!(hsm.transition(SWITCH, VariantVec::new()));
        concrete.dispatch_events();
        assert_eq!(hsm.active_states(), vec![ON]);
    }

    #[test]
    fn composite_entry_point() {
        let mut hsm = Hsm::new();
        let a = StateId(0);
        let p = StateId(3);
        let b = StateId(1);
        let c = StateId(2);
        let e1 = EventId(0);

        hsm.register_state(a, StateCallbacks::new());
        hsm.register_state(b, StateCallbacks::new());
        hsm.register_state(c, StateCallbacks::new());
        hsm.register_state(p, StateCallbacks::new());
        hsm.register_substate_entry_point(p, b, None, None, true);
        hsm.register_substate(p, c);
        hsm.register_transition(a, p, e1, None, None, true);
        hsm.register_transition(b, c, e1, None, None, true);

        let concrete = Arc::new(CooperativeDispatcher::new());
        let dispatcher: Arc<dyn HsmEventDispatcher> = concrete.clone();
        assert!(hsm.initialize(dispatcher, a));

        hsm.transition(e1, VariantVec::new());
        concrete.dispatch_events();
        let active = hsm.active_states();
        assert!(active.contains(&p) && active.contains(&b));

        hsm.transition(e1, VariantVec::new());
        concrete.dispatch_events();
        let active = hsm.active_states();
        assert!(active.contains(&p) && active.contains(&c));
    }

    #[test]
    fn guard_veto_reports_failure() {
        let mut hsm = Hsm::new();
        let a = StateId(0);
        let b = StateId(1);
        let e1 = EventId(0);
        hsm.register_state(a, StateCallbacks::new());
        hsm.register_state(b, StateCallbacks::new());
        let guard: crate::callbacks::GuardCallback =
            Box::new(|args: &VariantVec| args.first().map(|v| v.to_string()) == Some("go".to_string()));
        hsm.register_transition(a, b, e1, None, Some(guard), true);

        let failed = Arc::new(AtomicBool::new(false));
        let failed2 = failed.clone();
        hsm.register_failed_transition_callback(Box::new(move |_active, _event, _args| {
            failed2.store(true, Ordering::SeqCst);
        }));

        let concrete = Arc::new(CooperativeDispatcher::new());
        let dispatcher: Arc<dyn HsmEventDispatcher> = concrete.clone();
        assert!(hsm.initialize(dispatcher, a));

        hsm.transition(e1, vec![crate::variant::Variant::from("stop")]);
        concrete.dispatch_events();
        assert_eq!(hsm.active_states(), vec![a]);
        assert!(failed.load(Ordering::SeqCst));
    }

    #[test]
    fn internal_self_transition_never_exits() {
        let mut hsm = Hsm::new();
        let a = StateId(0);
        let e1 = EventId(0);
        hsm.register_state(a, StateCallbacks::new());
        let exited = Arc::new(AtomicBool::new(false));
        let exited2 = exited.clone();
        hsm.register_state(
            a,
            StateCallbacks::new().with_on_exiting(Box::new(move || {
                exited2.store(true, Ordering::SeqCst);
                true
            })),
        );
        hsm.register_self_transition(a, e1, TransitionType::Internal, None, None, true);

        let concrete = Arc::new(CooperativeDispatcher::new());
        let dispatcher: Arc<dyn HsmEventDispatcher> = concrete.clone();
        assert!(hsm.initialize(dispatcher, a));
        hsm.transition(e1, VariantVec::new());
        concrete.dispatch_events();
        assert!(!exited.load(Ordering::SeqCst));
        assert_eq!(hsm.active_states(), vec![a]);
    }
}
