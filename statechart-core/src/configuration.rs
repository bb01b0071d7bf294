//! Active configuration and history records.

use crate::document::{Document, StateId};
use std::collections::{BTreeSet, HashMap};

/// The set of active states plus recorded history.
///
/// The root is implicitly active while the machine runs and is never stored.
/// Iteration is in document order.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    active: BTreeSet<StateId>,
    history: HashMap<StateId, Vec<StateId>>,
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, id: StateId) -> bool {
        self.active.contains(&id)
    }

    pub fn insert(&mut self, id: StateId) -> bool {
        self.active.insert(id)
    }

    pub fn remove(&mut self, id: StateId) -> bool {
        self.active.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Active states in document order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = StateId> + '_ {
        self.active.iter().copied()
    }

    /// Active atomic and final states in document order.
    pub fn atomic_states<'a>(&'a self, doc: &'a Document) -> impl Iterator<Item = StateId> + 'a {
        self.iter().filter(move |id| doc.is_atomic(*id))
    }

    /// Active states with no active child, in document order.
    pub fn leaves<'a>(&'a self, doc: &'a Document) -> impl Iterator<Item = StateId> + 'a {
        self.iter()
            .filter(move |id| !doc.child_states(*id).any(|c| self.is_active(c)))
    }

    /// Names of the active states.
    ///
    /// Compressed lists only the innermost active state of each region;
    /// otherwise every active state, ancestors included.
    pub fn active_state_names(&self, doc: &Document, compressed: bool) -> Vec<String> {
        if compressed {
            self.leaves(doc)
                .map(|id| doc.name_of(id).to_string())
                .collect()
        } else {
            self.iter().map(|id| doc.name_of(id).to_string()).collect()
        }
    }

    /// Completion predicate: a compound state is done when an active child is
    /// final, a parallel state when every region is done.
    pub fn is_in_final_state(&self, doc: &Document, id: StateId) -> bool {
        if doc.is_compound(id) {
            doc.child_states(id)
                .any(|c| doc.is_final(c) && self.is_active(c))
        } else if doc.is_parallel(id) {
            doc.child_states(id).all(|c| self.is_in_final_state(doc, c))
        } else {
            false
        }
    }

    pub fn record_history(&mut self, history: StateId, states: Vec<StateId>) {
        self.history.insert(history, states);
    }

    /// States recorded for a history pseudo-state, if its parent was exited.
    pub fn history_of(&self, history: StateId) -> Option<&[StateId]> {
        self.history.get(&history).map(Vec::as_slice)
    }
}
