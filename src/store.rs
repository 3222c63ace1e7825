//! Structure Store (C1): the static topology of states, hierarchy,
//! transitions, entry points, history and timer bindings.
//!
//! Everything here is populated by application code between construction and
//! [`crate::engine::Hsm::initialize`] and is read-only afterwards (§4.1).
//! Mutators never panic; they report structural violations by returning
//! `false` and leaving the store untouched.

use std::collections::HashMap;

use crate::callbacks::{GuardCallback, HistoryCallback, StateCallbacks, TransitionCallback};
use crate::types::{
    EventId, HistoryType, StateAction, StateActionTrigger, StateId, TimerId, TransitionKind,
    TransitionType,
};
use crate::variant::VariantVec;

pub(crate) struct EntryPointRecord {
    pub child: StateId,
    pub event_filter: Option<EventId>,
    pub guard: Option<GuardCallback>,
    pub expected: bool,
}

pub(crate) struct TransitionRecord {
    pub to: StateId,
    pub event: EventId,
    pub callback: Option<TransitionCallback>,
    pub guard: Option<GuardCallback>,
    pub expected: bool,
    pub kind: TransitionKind,
}

impl TransitionRecord {
    fn guard_matches(&self, args: &VariantVec) -> bool {
        match &self.guard {
            Some(g) => g(args) == self.expected,
            None => true,
        }
    }
}

impl EntryPointRecord {
    fn matches_event(&self, event: EventId) -> bool {
        match self.event_filter {
            Some(f) => f == event,
            None => true,
        }
    }

    fn guard_matches(&self, args: &VariantVec) -> bool {
        match &self.guard {
            Some(g) => g(args) == self.expected,
            None => true,
        }
    }
}

pub(crate) struct HistoryRecord {
    pub history_state: StateId,
    pub history_type: HistoryType,
    pub default_target: StateId,
    pub callback: Option<HistoryCallback>,
}

/// Result of a successful ancestor walk for an external/internal-candidate
/// lookup: the ancestor the transition is declared on, plus every
/// guard-matched record found there (a len > 1 result is a parallel
/// fan-out, §3).
pub(crate) struct TransitionMatch<'a> {
    pub declared_on: StateId,
    pub records: Vec<&'a TransitionRecord>,
}

#[derive(Default)]
pub struct StructureStore {
    states: HashMap<StateId, StateCallbacks>,
    /// Present only for final states; value is the declared exit event, if any.
    finals: HashMap<StateId, Option<EventId>>,
    parent: HashMap<StateId, StateId>,
    children: HashMap<StateId, Vec<StateId>>,
    entry_points: HashMap<StateId, Vec<EntryPointRecord>>,
    transitions: HashMap<(StateId, EventId), Vec<TransitionRecord>>,
    history: HashMap<StateId, HistoryRecord>,
    /// Reverse lookup: history pseudo-state id -> owning parent.
    history_by_id: HashMap<StateId, StateId>,
    timers: HashMap<TimerId, EventId>,
    state_actions: HashMap<(StateId, StateActionTrigger), Vec<StateAction>>,
}

impl StructureStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------- states

    /// First call defines the state; subsequent calls replace its callbacks.
    pub fn register_state(&mut self, id: StateId, callbacks: StateCallbacks) -> bool {
        if !id.is_valid() {
            return false;
        }
        self.states.insert(id, callbacks);
        true
    }

    pub fn register_final_state(
        &mut self,
        id: StateId,
        exit_event: Option<EventId>,
        callbacks: StateCallbacks,
    ) -> bool {
        if !id.is_valid() {
            return false;
        }
        self.states.insert(id, callbacks);
        self.finals.insert(id, exit_event);
        true
    }

    pub fn is_final(&self, id: StateId) -> bool {
        self.finals.contains_key(&id)
    }

    pub fn final_exit_event(&self, id: StateId) -> Option<Option<EventId>> {
        self.finals.get(&id).copied()
    }

    pub fn is_known_state(&self, id: StateId) -> bool {
        self.states.contains_key(&id)
    }

    pub fn callbacks(&self, id: StateId) -> Option<&StateCallbacks> {
        self.states.get(&id)
    }

    // ------------------------------------------------------------ hierarchy

    fn would_cycle(&self, parent: StateId, child: StateId) -> bool {
        // Registering parent -> child would cycle if `child` is already an
        // ancestor of `parent` (including parent == child).
        let mut cur = Some(parent);
        while let Some(s) = cur {
            if s == child {
                return true;
            }
            cur = self.parent.get(&s).copied();
        }
        false
    }

    fn attach_child(&mut self, parent: StateId, child: StateId) -> bool {
        if !parent.is_valid() || !child.is_valid() || parent == child {
            return false;
        }
        if let Some(existing) = self.parent.get(&child) {
            if *existing != parent {
                return false;
            }
            return true; // idempotent re-registration
        }
        if self.would_cycle(parent, child) {
            return false;
        }
        self.parent.insert(child, parent);
        let kids = self.children.entry(parent).or_default();
        if !kids.contains(&child) {
            kids.push(child);
        }
        true
    }

    pub fn register_substate(&mut self, parent: StateId, child: StateId) -> bool {
        self.attach_child(parent, child)
    }

    pub fn register_substate_entry_point(
        &mut self,
        parent: StateId,
        child: StateId,
        event_filter: Option<EventId>,
        guard: Option<GuardCallback>,
        expected: bool,
    ) -> bool {
        if !self.attach_child(parent, child) {
            return false;
        }
        self.entry_points.entry(parent).or_default().push(EntryPointRecord {
            child,
            event_filter,
            guard,
            expected,
        });
        true
    }

    pub fn parent_of(&self, state: StateId) -> Option<StateId> {
        self.parent.get(&state).copied()
    }

    pub fn children_of(&self, state: StateId) -> &[StateId] {
        self.children.get(&state).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_composite(&self, state: StateId) -> bool {
        !self.children_of(state).is_empty()
    }

    /// `true` iff `ancestor` is `state` itself or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: StateId, state: StateId) -> bool {
        let mut cur = Some(state);
        while let Some(s) = cur {
            if s == ancestor {
                return true;
            }
            cur = self.parent.get(&s).copied();
        }
        false
    }

    /// Deepest state that is an ancestor of both `a` and `b` (possibly `a`
    /// or `b` themselves).
    pub fn least_common_ancestor(&self, a: StateId, b: StateId) -> Option<StateId> {
        let mut ancestors_of_b = Vec::new();
        let mut cur = Some(b);
        while let Some(s) = cur {
            ancestors_of_b.push(s);
            cur = self.parent.get(&s).copied();
        }
        let mut cur = Some(a);
        while let Some(s) = cur {
            if ancestors_of_b.contains(&s) {
                return Some(s);
            }
            cur = self.parent.get(&s).copied();
        }
        None
    }

    /// Ancestor chain of `state`, innermost first, NOT including `state`
    /// itself, up to and including the root.
    pub fn ancestors(&self, state: StateId) -> Vec<StateId> {
        let mut out = Vec::new();
        let mut cur = self.parent.get(&state).copied();
        while let Some(s) = cur {
            out.push(s);
            cur = self.parent.get(&s).copied();
        }
        out
    }

    // ----------------------------------------------------------- transitions

    pub fn register_transition(
        &mut self,
        from: StateId,
        to: StateId,
        event: EventId,
        callback: Option<TransitionCallback>,
        guard: Option<GuardCallback>,
        expected: bool,
    ) -> bool {
        if !from.is_valid() || !to.is_valid() || !event.is_valid() {
            return false;
        }
        self.transitions.entry((from, event)).or_default().push(TransitionRecord {
            to,
            event,
            callback,
            guard,
            expected,
            kind: TransitionKind::External,
        });
        true
    }

    pub fn register_self_transition(
        &mut self,
        state: StateId,
        event: EventId,
        kind: TransitionType,
        callback: Option<TransitionCallback>,
        guard: Option<GuardCallback>,
        expected: bool,
    ) -> bool {
        if !state.is_valid() || !event.is_valid() {
            return false;
        }
        let kind = match kind {
            TransitionType::Internal => TransitionKind::Internal,
            TransitionType::External => TransitionKind::External,
        };
        self.transitions.entry((state, event)).or_default().push(TransitionRecord {
            to: state,
            event,
            callback,
            guard,
            expected,
            kind,
        });
        true
    }

    /// Internal self-transitions registered directly on `state` for `event`
    /// whose guard matches `args`. These take priority over any external
    /// candidate found by [`Self::find_external_match`] (§4.4.1 step 3).
    pub(crate) fn internal_self_transitions(
        &self,
        state: StateId,
        event: EventId,
        args: &VariantVec,
    ) -> Vec<&TransitionRecord> {
        self.transitions
            .get(&(state, event))
            .into_iter()
            .flatten()
            .filter(|r| r.kind == TransitionKind::Internal && r.guard_matches(args))
            .collect()
    }

    /// Walks from `state` to the root, returning the first ancestor
    /// (innermost wins) that declares at least one non-internal transition
    /// for `event` whose guard matches `args`. All matching records at that
    /// ancestor are returned together (parallel fan-out, §3/§4.4.1 step 2).
    pub(crate) fn find_external_match(
        &self,
        state: StateId,
        event: EventId,
        args: &VariantVec,
    ) -> Option<TransitionMatch<'_>> {
        let mut cur = Some(state);
        while let Some(s) = cur {
            if let Some(records) = self.transitions.get(&(s, event)) {
                let matches: Vec<&TransitionRecord> = records
                    .iter()
                    .filter(|r| r.kind != TransitionKind::Internal && r.guard_matches(args))
                    .collect();
                if !matches.is_empty() {
                    return Some(TransitionMatch {
                        declared_on: s,
                        records: matches,
                    });
                }
            }
            cur = self.parent.get(&s).copied();
        }
        None
    }

    /// `true` iff some transition (internal or external, anywhere in the
    /// ancestor chain) would match `event`/`args` from `state`. Used by
    /// `is_transition_possible` without executing anything.
    pub(crate) fn has_any_match(&self, state: StateId, event: EventId, args: &VariantVec) -> bool {
        if !self.internal_self_transitions(state, event, args).is_empty() {
            return true;
        }
        self.find_external_match(state, event, args).is_some()
    }

    // ---------------------------------------------------------- entry points

    /// Resolves the children to activate when entering composite `parent`
    /// on event `event` with args `args` (§4.4.2). Returns an empty vector
    /// if no entry point matches (the caller treats this as
    /// `EntryPointUnresolved`).
    pub(crate) fn entry_points_for(
        &self,
        parent: StateId,
        event: EventId,
        args: &VariantVec,
    ) -> Vec<StateId> {
        let Some(records) = self.entry_points.get(&parent) else {
            return Vec::new();
        };

        let filtered: Vec<StateId> = records
            .iter()
            .filter(|r| r.event_filter.is_some() && r.matches_event(event) && r.guard_matches(args))
            .map(|r| r.child)
            .collect();
        if !filtered.is_empty() {
            return filtered;
        }

        records
            .iter()
            .filter(|r| r.event_filter.is_none() && r.guard_matches(args))
            .map(|r| r.child)
            .collect()
    }

    // -------------------------------------------------------------- history

    pub fn register_history(
        &mut self,
        parent: StateId,
        history_state: StateId,
        history_type: HistoryType,
        default_target: StateId,
        callback: Option<HistoryCallback>,
    ) -> bool {
        if !parent.is_valid() || !history_state.is_valid() {
            return false;
        }
        self.history_by_id.insert(history_state, parent);
        self.history.insert(
            parent,
            HistoryRecord {
                history_state,
                history_type,
                default_target,
                callback,
            },
        );
        true
    }

    pub fn is_history_state(&self, id: StateId) -> bool {
        self.history_by_id.contains_key(&id)
    }

    pub(crate) fn history_owner(&self, history_state: StateId) -> Option<StateId> {
        self.history_by_id.get(&history_state).copied()
    }

    pub(crate) fn history_of(&self, parent: StateId) -> Option<&HistoryRecord> {
        self.history.get(&parent)
    }

    // --------------------------------------------------------------- timers

    pub fn register_timer(&mut self, timer: TimerId, event: EventId) -> bool {
        if !timer.is_valid() || !event.is_valid() {
            return false;
        }
        self.timers.insert(timer, event);
        true
    }

    pub fn timer_event(&self, timer: TimerId) -> Option<EventId> {
        self.timers.get(&timer).copied()
    }

    // --------------------------------------------------------- state actions

    pub fn register_state_action(
        &mut self,
        state: StateId,
        trigger: StateActionTrigger,
        action: StateAction,
    ) -> bool {
        if !state.is_valid() {
            return false;
        }
        self.state_actions.entry((state, trigger)).or_default().push(action);
        true
    }

    pub(crate) fn state_actions_for(
        &self,
        state: StateId,
        trigger: StateActionTrigger,
    ) -> &[StateAction] {
        self.state_actions
            .get(&(state, trigger))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_cycles() {
        let mut store = StructureStore::new();
        let a = StateId(1);
        let b = StateId(2);
        let c = StateId(3);
        assert!(store.register_substate(a, b));
        assert!(store.register_substate(b, c));
        // c -> a would close a cycle a -> b -> c -> a
        assert!(!store.register_substate(c, a));
    }

    #[test]
    fn rejects_self_parenting() {
        let mut store = StructureStore::new();
        let a = StateId(1);
        assert!(!store.register_substate(a, a));
    }

    #[test]
    fn rejects_reparenting_to_a_different_parent() {
        let mut store = StructureStore::new();
        let p1 = StateId(1);
        let p2 = StateId(2);
        let child = StateId(3);
        assert!(store.register_substate(p1, child));
        assert!(!store.register_substate(p2, child));
        // re-registering under the same parent is idempotent
        assert!(store.register_substate(p1, child));
    }

    #[test]
    fn least_common_ancestor_finds_deepest_shared_parent() {
        let mut store = StructureStore::new();
        let root = StateId(0);
        let p = StateId(1);
        let a = StateId(2);
        let b = StateId(3);
        store.register_substate(root, p);
        store.register_substate(p, a);
        store.register_substate(p, b);
        assert_eq!(store.least_common_ancestor(a, b), Some(p));
        assert_eq!(store.least_common_ancestor(a, root), Some(root));
    }

    #[test]
    fn filtered_entry_points_dominate_unfiltered() {
        let mut store = StructureStore::new();
        let parent = StateId(1);
        let unfiltered = StateId(2);
        let filtered = StateId(3);
        let e1 = EventId(10);
        store.register_substate_entry_point(parent, unfiltered, None, None, true);
        store.register_substate_entry_point(parent, filtered, Some(e1), None, true);
        let args = VariantVec::new();
        assert_eq!(store.entry_points_for(parent, e1, &args), vec![filtered]);
        assert_eq!(store.entry_points_for(parent, EventId(99), &args), vec![unfiltered]);
    }
}
