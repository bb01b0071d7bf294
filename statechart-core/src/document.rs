//! Statechart document model.
//!
//! Documents use a JSON DSL:
//!
//! ```json
//! {
//!   "name": "statenames",
//!   "initial": "top",
//!   "states": [
//!     {"id": "top", "type": "parallel", "states": [
//!       {"id": "a", "initial": "a1", "states": [{"id": "a1"}, {"id": "a2"}]},
//!       {"id": "b", "states": [{"id": "final", "type": "final"}]}
//!     ]}
//!   ]
//! }
//! ```
//!
//! A loaded [`Document`] is an arena: every node and transition is addressed
//! by a stable index. Nodes are numbered in pre-order, so comparing two
//! [`StateId`]s compares their document order. Index 0 is the implicit root
//! standing for the document itself; it has no name and never appears in
//! name listings.

use crate::error::ChartError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Index of a state node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(usize);

impl StateId {
    pub const ROOT: StateId = StateId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a transition in a [`Document`]. Also its document-order rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransitionId(usize);

impl TransitionId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Depth of a history pseudo-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryDepth {
    #[default]
    Shallow,
    Deep,
}

/// Kind of a state node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    Atomic,
    Compound,
    Parallel,
    Final,
    History(HistoryDepth),
}

/// Whether a transition exits its source when all targets are descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    #[default]
    External,
    Internal,
}

/// Executable content. Interpreted by an [`Evaluator`](crate::Evaluator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Enqueue an internal event.
    Raise {
        event: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        data: Value,
    },
    /// Enqueue an external event, optionally after a delay.
    Send {
        event: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        data: Value,
        #[serde(default, skip_serializing_if = "is_zero")]
        delay_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Cancel a pending delayed send.
    Cancel { id: String },
    /// Write a literal `value` or the result of `expr` into the data model.
    Assign {
        location: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expr: Option<String>,
    },
    Log {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expr: Option<String>,
    },
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// Raw state kind as written in the DSL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawStateKind {
    #[default]
    State,
    Parallel,
    Final,
    History,
}

/// Raw transition as stored/transmitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTransition {
    /// Event descriptors. Absent for eventless transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,

    /// Guard expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cond: Option<String>,

    /// Target state(s). Can be a single id or several.
    #[serde(
        default,
        deserialize_with = "deserialize_ids",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub target: Vec<String>,

    #[serde(default, rename = "type")]
    pub kind: TransitionKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Action>,
}

/// Raw state as stored/transmitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawState {
    pub id: String,

    #[serde(default, rename = "type")]
    pub kind: RawStateKind,

    #[serde(
        default,
        deserialize_with = "deserialize_ids",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub initial: Vec<String>,

    /// Depth of a history state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryDepth>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_entry: Vec<Action>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_exit: Vec<Action>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<RawTransition>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<RawState>,

    /// Payload of the completion event produced by entering a final state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_data: Option<Value>,
}

/// Raw document as stored/transmitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(
        default,
        deserialize_with = "deserialize_ids",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub initial: Vec<String>,

    /// Initial data model.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub datamodel: Value,

    pub states: Vec<RawState>,
}

fn deserialize_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};
    use std::fmt;

    struct IdsVisitor;

    impl<'de> Visitor<'de> for IdsVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a state id or array of state ids")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut ids = Vec::new();
            while let Some(s) = seq.next_element::<String>()? {
                ids.push(s);
            }
            Ok(ids)
        }
    }

    deserializer.deserialize_any(IdsVisitor)
}

/// A state node in the arena.
#[derive(Debug, Clone)]
pub struct StateNode {
    /// Unique name. Empty for the root.
    pub name: String,
    pub kind: StateKind,
    pub parent: Option<StateId>,
    /// Children in document order, history pseudo-states included.
    pub children: Vec<StateId>,
    /// Default entry targets of a compound node.
    pub initial: Vec<StateId>,
    /// Outgoing transitions in document order.
    pub transitions: Vec<TransitionId>,
    /// Default transition of a history pseudo-state.
    pub history_default: Option<TransitionId>,
    pub on_entry: Vec<Action>,
    pub on_exit: Vec<Action>,
    pub done_data: Option<Value>,
}

/// A transition in the arena.
#[derive(Debug, Clone)]
pub struct Transition {
    pub source: StateId,
    pub targets: Vec<StateId>,
    pub event: Option<String>,
    pub cond: Option<String>,
    pub kind: TransitionKind,
    pub actions: Vec<Action>,
}

impl Transition {
    pub fn is_eventless(&self) -> bool {
        self.event.is_none()
    }

    pub fn is_targetless(&self) -> bool {
        self.targets.is_empty()
    }
}

/// Validated and indexed statechart document.
#[derive(Debug, Clone)]
pub struct Document {
    /// Document name.
    pub name: String,

    nodes: Vec<StateNode>,
    transitions: Vec<Transition>,
    by_name: HashMap<String, StateId>,

    /// Initial data model.
    pub datamodel: Value,

    /// Original raw document for storage.
    pub raw: RawDocument,

    /// Hash of the document for integrity checks.
    pub checksum: String,
}

impl Document {
    /// Parses and validates a document from JSON.
    pub fn from_json(json: &Value) -> Result<Self, ChartError> {
        let raw: RawDocument = serde_json::from_value(json.clone())?;
        Self::from_raw(raw)
    }

    /// Parses and validates a document from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ChartError> {
        let raw: RawDocument = serde_json::from_str(s)?;
        Self::from_raw(raw)
    }

    /// Creates a document from raw parts.
    pub fn from_raw(raw: RawDocument) -> Result<Self, ChartError> {
        if raw.states.is_empty() {
            return Err(ChartError::structural("document has no states"));
        }

        let mut builder = Builder::default();
        builder.nodes.push(StateNode {
            name: String::new(),
            kind: StateKind::Compound,
            parent: None,
            children: Vec::new(),
            initial: Vec::new(),
            transitions: Vec::new(),
            history_default: None,
            on_entry: Vec::new(),
            on_exit: Vec::new(),
            done_data: None,
        });
        for state in &raw.states {
            let child = builder.add_state(state, StateId::ROOT)?;
            builder.nodes[0].children.push(child);
        }
        builder.resolve(&raw)?;

        let datamodel = if raw.datamodel.is_null() {
            Value::Object(Default::default())
        } else {
            raw.datamodel.clone()
        };

        // Compute checksum
        let json_bytes = serde_json::to_vec(&raw)?;
        let checksum = format!("{:08x}", crc32c::crc32c(&json_bytes));

        Ok(Self {
            name: raw.name.clone().unwrap_or_default(),
            nodes: builder.nodes,
            transitions: builder.transitions,
            by_name: builder.by_name,
            datamodel,
            raw,
            checksum,
        })
    }

    pub fn root(&self) -> StateId {
        StateId::ROOT
    }

    pub fn node(&self, id: StateId) -> &StateNode {
        &self.nodes[id.0]
    }

    pub fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[id.0]
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// All node ids in document order, root first.
    pub fn ids(&self) -> impl Iterator<Item = StateId> + '_ {
        (0..self.nodes.len()).map(StateId)
    }

    /// Looks up a state by name.
    pub fn find(&self, name: &str) -> Option<StateId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: StateId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn kind(&self, id: StateId) -> StateKind {
        self.nodes[id.0].kind
    }

    pub fn parent(&self, id: StateId) -> Option<StateId> {
        self.nodes[id.0].parent
    }

    /// Compound nodes, the root included.
    pub fn is_compound(&self, id: StateId) -> bool {
        self.kind(id) == StateKind::Compound
    }

    pub fn is_parallel(&self, id: StateId) -> bool {
        self.kind(id) == StateKind::Parallel
    }

    pub fn is_final(&self, id: StateId) -> bool {
        self.kind(id) == StateKind::Final
    }

    pub fn is_history(&self, id: StateId) -> bool {
        matches!(self.kind(id), StateKind::History(_))
    }

    /// Atomic and final states (the leaves of a configuration).
    pub fn is_atomic(&self, id: StateId) -> bool {
        matches!(self.kind(id), StateKind::Atomic | StateKind::Final)
    }

    /// Children that are real states (history pseudo-states excluded).
    pub fn child_states(&self, id: StateId) -> impl Iterator<Item = StateId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(move |c| !self.is_history(*c))
    }

    /// History pseudo-states declared directly under a node.
    pub fn history_children(&self, id: StateId) -> impl Iterator<Item = StateId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(move |c| self.is_history(*c))
    }

    /// Ancestors of `id`, innermost first, stopping before `upto` (exclusive).
    /// With `None` the walk includes the root.
    pub fn proper_ancestors(&self, id: StateId, upto: Option<StateId>) -> Vec<StateId> {
        let mut result = Vec::new();
        let mut current = self.parent(id);
        while let Some(p) = current {
            if Some(p) == upto {
                break;
            }
            result.push(p);
            current = self.parent(p);
        }
        result
    }

    /// Returns true if `id` is a proper descendant of `ancestor`.
    pub fn is_descendant(&self, id: StateId, ancestor: StateId) -> bool {
        let mut current = self.parent(id);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.parent(p);
        }
        false
    }

    /// Static state names in document order.
    ///
    /// Compressed lists only atomic and final leaves; otherwise every state
    /// except history pseudo-states and the root.
    pub fn state_names(&self, compressed: bool) -> Vec<String> {
        self.ids()
            .skip(1)
            .filter(|id| !self.is_history(*id))
            .filter(|id| !compressed || self.is_atomic(*id))
            .map(|id| self.name_of(id).to_string())
            .collect()
    }

    /// Returns the raw document as JSON.
    pub fn to_json(&self) -> Result<Value, ChartError> {
        Ok(serde_json::to_value(&self.raw)?)
    }
}

#[derive(Default)]
struct Builder {
    nodes: Vec<StateNode>,
    transitions: Vec<Transition>,
    by_name: HashMap<String, StateId>,
    /// Raw transitions and initial ids waiting for every name to be known.
    pending: Vec<(StateId, RawState)>,
}

impl Builder {
    fn add_state(&mut self, raw: &RawState, parent: StateId) -> Result<StateId, ChartError> {
        if raw.id.is_empty() || raw.id.chars().any(char::is_whitespace) {
            return Err(ChartError::structural(format!(
                "invalid state id '{}'",
                raw.id
            )));
        }
        if self.by_name.contains_key(&raw.id) {
            return Err(ChartError::structural(format!(
                "duplicate state id '{}'",
                raw.id
            )));
        }

        let has_child_states = raw
            .states
            .iter()
            .any(|s| s.kind != RawStateKind::History);
        let kind = match raw.kind {
            RawStateKind::State if has_child_states => StateKind::Compound,
            RawStateKind::State if !raw.states.is_empty() => {
                return Err(ChartError::structural(format!(
                    "state '{}' has history children but no child states",
                    raw.id
                )));
            }
            RawStateKind::State => StateKind::Atomic,
            RawStateKind::Parallel => StateKind::Parallel,
            RawStateKind::Final => StateKind::Final,
            RawStateKind::History => StateKind::History(raw.history.unwrap_or_default()),
        };

        self.check_shape(raw, kind, parent)?;

        let id = StateId(self.nodes.len());
        self.nodes.push(StateNode {
            name: raw.id.clone(),
            kind,
            parent: Some(parent),
            children: Vec::new(),
            initial: Vec::new(),
            transitions: Vec::new(),
            history_default: None,
            on_entry: raw.on_entry.clone(),
            on_exit: raw.on_exit.clone(),
            done_data: raw.done_data.clone(),
        });
        self.by_name.insert(raw.id.clone(), id);
        self.pending.push((
            id,
            RawState {
                states: Vec::new(),
                ..raw.clone()
            },
        ));

        for child in &raw.states {
            let child_id = self.add_state(child, id)?;
            self.nodes[id.0].children.push(child_id);
        }

        Ok(id)
    }

    fn check_shape(
        &self,
        raw: &RawState,
        kind: StateKind,
        parent: StateId,
    ) -> Result<(), ChartError> {
        let fail = |what: &str| -> Result<(), ChartError> {
            Err(ChartError::structural(format!("state '{}' {}", raw.id, what)))
        };

        if !raw.initial.is_empty() && kind != StateKind::Compound {
            return fail("declares an initial but is not a compound state");
        }
        if raw.history.is_some() && !matches!(kind, StateKind::History(_)) {
            return fail("declares a history depth but is not a history state");
        }
        if raw.done_data.is_some() && kind != StateKind::Final {
            return fail("declares done_data but is not a final state");
        }
        if kind == StateKind::Parallel && raw.states.iter().all(|s| s.kind == RawStateKind::History)
        {
            return fail("is parallel but has no regions");
        }
        if kind == StateKind::Final && self.nodes[parent.0].kind == StateKind::Parallel {
            return fail("is a final state directly inside a parallel state");
        }
        match kind {
            StateKind::Final => {
                if !raw.states.is_empty() {
                    return fail("is final but has children");
                }
                if !raw.transitions.is_empty() {
                    return fail("is final but has transitions");
                }
            }
            StateKind::History(_) => {
                if parent == StateId::ROOT {
                    return fail("is a history state at the top level");
                }
                if !raw.states.is_empty() {
                    return fail("is a history state with children");
                }
                if !raw.on_entry.is_empty() || !raw.on_exit.is_empty() {
                    return fail("is a history state with entry or exit actions");
                }
                if raw.transitions.len() > 1 {
                    return fail("is a history state with more than one default transition");
                }
                if let Some(t) = raw.transitions.first() {
                    if t.event.is_some() || t.cond.is_some() || t.target.is_empty() {
                        return fail("has a history default transition with an event, a guard or no target");
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn lookup(&self, name: &str, context: &str) -> Result<StateId, ChartError> {
        self.by_name.get(name).copied().ok_or_else(|| {
            ChartError::structural(format!("{} references unknown state '{}'", context, name))
        })
    }

    fn is_descendant(&self, id: StateId, ancestor: StateId) -> bool {
        let mut current = self.nodes[id.0].parent;
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.nodes[p.0].parent;
        }
        false
    }

    /// Innermost proper ancestor shared by `a` and `b`.
    fn common_ancestor(&self, a: StateId, b: StateId) -> StateId {
        let mut current = self.nodes[a.0].parent;
        while let Some(p) = current {
            if self.is_descendant(b, p) {
                return p;
            }
            current = self.nodes[p.0].parent;
        }
        StateId::ROOT
    }

    /// Rejects target lists that cannot be active at the same time: two
    /// unrelated targets must sit in different regions of a parallel state.
    fn check_compatible(&self, targets: &[StateId], what: &str) -> Result<(), ChartError> {
        for (i, &a) in targets.iter().enumerate() {
            for &b in &targets[i + 1..] {
                if a == b || self.is_descendant(a, b) || self.is_descendant(b, a) {
                    continue;
                }
                if self.nodes[self.common_ancestor(a, b).0].kind != StateKind::Parallel {
                    return Err(ChartError::structural(format!(
                        "{} targets '{}' and '{}', which cannot be active together",
                        what, self.nodes[a.0].name, self.nodes[b.0].name
                    )));
                }
            }
        }
        Ok(())
    }

    fn first_child_state(&self, id: StateId) -> Option<StateId> {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .find(|c| !matches!(self.nodes[c.0].kind, StateKind::History(_)))
    }

    fn resolve(&mut self, doc: &RawDocument) -> Result<(), ChartError> {
        // Root default entry
        let root_initial = if doc.initial.is_empty() {
            self.first_child_state(StateId::ROOT).into_iter().collect()
        } else {
            doc.initial
                .iter()
                .map(|n| self.lookup(n, "document initial"))
                .collect::<Result<Vec<_>, _>>()?
        };
        if let Some(h) = root_initial.iter().find(|t| {
            matches!(self.nodes[t.0].kind, StateKind::History(_))
        }) {
            return Err(ChartError::structural(format!(
                "document initial targets history state '{}'",
                self.nodes[h.0].name
            )));
        }
        self.check_compatible(&root_initial, "document initial")?;
        self.nodes[0].initial = root_initial;

        let pending = std::mem::take(&mut self.pending);
        for (id, raw) in &pending {
            let id = *id;
            let context = format!("state '{}'", raw.id);

            if self.nodes[id.0].kind == StateKind::Compound {
                let initial = if raw.initial.is_empty() {
                    self.first_child_state(id).into_iter().collect()
                } else {
                    raw.initial
                        .iter()
                        .map(|n| self.lookup(n, &context))
                        .collect::<Result<Vec<_>, _>>()?
                };
                for target in &initial {
                    if !self.is_descendant(*target, id) {
                        return Err(ChartError::structural(format!(
                            "initial '{}' of state '{}' is not a descendant",
                            self.nodes[target.0].name, raw.id
                        )));
                    }
                }
                if initial.is_empty() {
                    return Err(ChartError::structural(format!(
                        "compound state '{}' has no initial child",
                        raw.id
                    )));
                }
                self.check_compatible(&initial, &format!("initial of {}", context))?;
                self.nodes[id.0].initial = initial;
            }

            if let StateKind::History(_) = self.nodes[id.0].kind {
                let parent = self.nodes[id.0].parent.unwrap_or(StateId::ROOT);
                let (targets, actions) = match raw.transitions.first() {
                    Some(t) => (
                        t.target
                            .iter()
                            .map(|n| self.lookup(n, &context))
                            .collect::<Result<Vec<_>, _>>()?,
                        t.actions.clone(),
                    ),
                    None if self.nodes[parent.0].kind == StateKind::Parallel => (
                        self.nodes[parent.0]
                            .children
                            .iter()
                            .copied()
                            .filter(|c| !matches!(self.nodes[c.0].kind, StateKind::History(_)))
                            .collect(),
                        Vec::new(),
                    ),
                    None => (self.nodes[parent.0].initial.clone(), Vec::new()),
                };
                if let Some(outside) = targets.iter().find(|t| !self.is_descendant(**t, parent)) {
                    return Err(ChartError::structural(format!(
                        "history state '{}' defaults to '{}' outside its parent",
                        raw.id, self.nodes[outside.0].name
                    )));
                }
                if targets
                    .iter()
                    .any(|t| matches!(self.nodes[t.0].kind, StateKind::History(_)))
                {
                    return Err(ChartError::structural(format!(
                        "history state '{}' defaults to another history state",
                        raw.id
                    )));
                }
                self.check_compatible(&targets, &format!("default of history {}", context))?;
                let tid = TransitionId(self.transitions.len());
                self.transitions.push(Transition {
                    source: id,
                    targets,
                    event: None,
                    cond: None,
                    kind: TransitionKind::External,
                    actions,
                });
                self.nodes[id.0].history_default = Some(tid);
                continue;
            }

            for t in &raw.transitions {
                if t.event.is_none() && t.cond.is_none() && t.target.is_empty() {
                    return Err(ChartError::structural(format!(
                        "state '{}' has an eventless, unguarded, targetless transition",
                        raw.id
                    )));
                }
                if t.event.as_deref().is_some_and(|e| e.trim().is_empty()) {
                    return Err(ChartError::structural(format!(
                        "state '{}' has a transition with an empty event",
                        raw.id
                    )));
                }
                let targets = t
                    .target
                    .iter()
                    .map(|n| self.lookup(n, &context))
                    .collect::<Result<Vec<_>, _>>()?;
                self.check_compatible(&targets, &format!("transition of {}", context))?;
                let tid = TransitionId(self.transitions.len());
                self.transitions.push(Transition {
                    source: id,
                    targets,
                    event: t.event.clone(),
                    cond: t.cond.clone(),
                    kind: t.kind,
                    actions: t.actions.clone(),
                });
                self.nodes[id.0].transitions.push(tid);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn statenames() -> Value {
        json!({
            "name": "statenames",
            "states": [
                {"id": "top", "type": "parallel", "states": [
                    {"id": "a", "initial": "a1", "states": [{"id": "a1"}, {"id": "a2"}]},
                    {"id": "b", "states": [{"id": "final", "type": "final"}]}
                ]}
            ]
        })
    }

    fn is_structural(result: Result<Document, ChartError>) -> bool {
        matches!(result, Err(ChartError::Structural { .. }))
    }

    #[test]
    fn test_parse_document() {
        let doc = Document::from_json(&statenames()).unwrap();

        assert_eq!(doc.name, "statenames");
        assert_eq!(doc.len(), 7);
        assert!(!doc.checksum.is_empty());

        let top = doc.find("top").unwrap();
        assert!(doc.is_parallel(top));
        assert_eq!(doc.parent(top), Some(doc.root()));
        assert!(doc.is_compound(doc.find("a").unwrap()));
        assert_eq!(doc.kind(doc.find("a1").unwrap()), StateKind::Atomic);
        assert!(doc.is_final(doc.find("final").unwrap()));
    }

    #[test]
    fn test_state_names() {
        let doc = Document::from_json(&statenames()).unwrap();
        assert_eq!(doc.state_names(true), vec!["a1", "a2", "final"]);
        assert_eq!(
            doc.state_names(false),
            vec!["top", "a", "a1", "a2", "b", "final"]
        );
    }

    #[test]
    fn test_state_names_nested() {
        let doc = Document::from_json(&json!({
            "states": [
                {"id": "super_top", "type": "parallel", "states": [{"id": "a"}, {"id": "b"}]}
            ]
        }))
        .unwrap();
        assert_eq!(doc.state_names(true), vec!["a", "b"]);
        assert_eq!(doc.state_names(false), vec!["super_top", "a", "b"]);
    }

    #[test]
    fn test_unusual_ids() {
        let doc = Document::from_json(&json!({
            "states": [{"id": "foo.bar"}, {"id": "foo-bar"}, {"id": "foo_bar"}, {"id": "_"}]
        }))
        .unwrap();
        assert_eq!(
            doc.state_names(false),
            vec!["foo.bar", "foo-bar", "foo_bar", "_"]
        );
    }

    #[test]
    fn test_document_order_and_ancestry() {
        let doc = Document::from_json(&statenames()).unwrap();
        let a1 = doc.find("a1").unwrap();
        let a = doc.find("a").unwrap();
        let top = doc.find("top").unwrap();
        let fin = doc.find("final").unwrap();

        assert!(top < a && a < a1 && a1 < fin);
        assert!(doc.is_descendant(a1, top));
        assert!(doc.is_descendant(a1, doc.root()));
        assert!(!doc.is_descendant(a, a1));
        assert!(!doc.is_descendant(a, a));
        assert_eq!(doc.proper_ancestors(a1, None), vec![a, top, doc.root()]);
        assert_eq!(doc.proper_ancestors(a1, Some(top)), vec![a]);
    }

    #[test]
    fn test_default_initial_is_first_child() {
        let doc = Document::from_json(&json!({
            "states": [{"id": "s", "states": [{"id": "h", "type": "history"}, {"id": "x"}, {"id": "y"}]}]
        }))
        .unwrap();
        let s = doc.find("s").unwrap();
        assert_eq!(doc.node(s).initial, vec![doc.find("x").unwrap()]);
        assert_eq!(doc.node(doc.root()).initial, vec![s]);
    }

    #[test]
    fn test_transitions_in_document_order() {
        let doc = Document::from_json(&json!({
            "states": [
                {"id": "a", "transitions": [
                    {"event": "go", "target": "b"},
                    {"event": "go stop", "cond": "ctx.x", "target": ["b"], "type": "internal"}
                ]},
                {"id": "b", "transitions": [{"cond": "ctx.back", "target": "a"}]}
            ]
        }))
        .unwrap();
        let a = doc.find("a").unwrap();
        let ts = &doc.node(a).transitions;
        assert_eq!(ts.len(), 2);
        assert!(ts[0] < ts[1]);
        let second = doc.transition(ts[1]);
        assert_eq!(second.kind, TransitionKind::Internal);
        assert_eq!(second.event.as_deref(), Some("go stop"));

        let back = doc.transition(doc.node(doc.find("b").unwrap()).transitions[0]);
        assert!(back.is_eventless());
        assert!(!back.is_targetless());
    }

    #[test]
    fn test_history_default_transition() {
        let doc = Document::from_json(&json!({
            "states": [{"id": "p", "states": [
                {"id": "h", "type": "history", "history": "deep", "transitions": [{"target": "y"}]},
                {"id": "x"},
                {"id": "y"}
            ]}]
        }))
        .unwrap();
        let h = doc.find("h").unwrap();
        assert_eq!(doc.kind(h), StateKind::History(HistoryDepth::Deep));
        let default = doc.transition(doc.node(h).history_default.unwrap());
        assert_eq!(default.targets, vec![doc.find("y").unwrap()]);
        assert_eq!(doc.state_names(false), vec!["p", "x", "y"]);
    }

    #[test]
    fn test_actions_parse() {
        let doc = Document::from_json(&json!({
            "states": [{"id": "a", "on_entry": [
                {"raise": {"event": "internalEvent1"}},
                {"send": {"event": "timeout", "delay_ms": 100, "id": "t"}},
                {"cancel": {"id": "t"}},
                {"assign": {"location": "count", "value": 1}},
                {"log": {"label": "entered"}}
            ]}]
        }))
        .unwrap();
        let a = doc.node(doc.find("a").unwrap());
        assert_eq!(a.on_entry.len(), 5);
        assert_eq!(
            a.on_entry[1],
            Action::Send {
                event: "timeout".to_string(),
                data: Value::Null,
                delay_ms: 100,
                id: Some("t".to_string()),
            }
        );
    }

    #[test]
    fn test_datamodel_defaults_to_object() {
        let doc = Document::from_json(&json!({"states": [{"id": "a"}]})).unwrap();
        assert_eq!(doc.datamodel, json!({}));
    }

    #[test]
    fn test_unknown_target() {
        assert!(is_structural(Document::from_json(&json!({
            "states": [{"id": "a", "transitions": [{"event": "go", "target": "nowhere"}]}]
        }))));
    }

    #[test]
    fn test_duplicate_id() {
        assert!(is_structural(Document::from_json(&json!({
            "states": [{"id": "a"}, {"id": "b", "states": [{"id": "a"}]}]
        }))));
    }

    #[test]
    fn test_empty_document() {
        assert!(is_structural(Document::from_json(&json!({"states": []}))));
    }

    #[test]
    fn test_initial_not_descendant() {
        assert!(is_structural(Document::from_json(&json!({
            "states": [
                {"id": "a", "initial": "b", "states": [{"id": "a1"}]},
                {"id": "b"}
            ]
        }))));
    }

    #[test]
    fn test_initial_on_atomic() {
        assert!(is_structural(Document::from_json(&json!({
            "states": [{"id": "a", "initial": "a"}]
        }))));
    }

    #[test]
    fn test_final_inside_parallel() {
        assert!(is_structural(Document::from_json(&json!({
            "states": [{"id": "p", "type": "parallel", "states": [{"id": "f", "type": "final"}]}]
        }))));
    }

    #[test]
    fn test_final_with_transitions() {
        assert!(is_structural(Document::from_json(&json!({
            "states": [{"id": "f", "type": "final", "transitions": [{"event": "x", "target": "f"}]}]
        }))));
    }

    #[test]
    fn test_history_at_top_level() {
        assert!(is_structural(Document::from_json(&json!({
            "states": [{"id": "a"}, {"id": "h", "type": "history"}]
        }))));
    }

    #[test]
    fn test_history_default_outside_parent() {
        assert!(is_structural(Document::from_json(&json!({
            "states": [
                {"id": "p", "states": [
                    {"id": "h", "type": "history", "transitions": [{"target": "q"}]},
                    {"id": "x"}
                ]},
                {"id": "q"}
            ]
        }))));
    }

    #[test]
    fn test_history_default_to_history() {
        assert!(is_structural(Document::from_json(&json!({
            "states": [
                {"id": "p", "states": [
                    {"id": "x"},
                    {"id": "h1", "type": "history", "transitions": [{"target": "h2"}]},
                    {"id": "h2", "type": "history", "transitions": [{"target": "h1"}]}
                ]}
            ]
        }))));
    }

    #[test]
    fn test_sibling_initial_targets() {
        assert!(is_structural(Document::from_json(&json!({
            "states": [
                {"id": "c", "initial": ["x", "y"], "states": [{"id": "x"}, {"id": "y"}]}
            ]
        }))));
        assert!(is_structural(Document::from_json(&json!({
            "initial": ["a", "b"],
            "states": [{"id": "a"}, {"id": "b"}]
        }))));
    }

    #[test]
    fn test_sibling_transition_targets() {
        let err = Document::from_json(&json!({
            "states": [
                {"id": "s", "transitions": [{"event": "go", "target": ["x", "y"]}]},
                {"id": "c", "states": [{"id": "x"}, {"id": "y"}]}
            ]
        }))
        .unwrap_err();
        assert!(matches!(err, ChartError::Structural { .. }));
        assert!(err.to_string().contains("cannot be active together"));

        // `z` is inside a parallel state, but `x` and `z` only share `c`.
        assert!(is_structural(Document::from_json(&json!({
            "states": [
                {"id": "s", "transitions": [{"event": "go", "target": ["x", "z"]}]},
                {"id": "c", "states": [
                    {"id": "x"},
                    {"id": "p", "type": "parallel", "states": [{"id": "z"}, {"id": "w"}]}
                ]}
            ]
        }))));
    }

    #[test]
    fn test_cross_region_targets() {
        let doc = Document::from_json(&json!({
            "initial": ["a2", "b2"],
            "states": [
                {"id": "s", "transitions": [{"event": "go", "target": ["a2", "b2", "p"]}]},
                {"id": "p", "type": "parallel", "states": [
                    {"id": "a", "initial": "a1", "states": [{"id": "a1"}, {"id": "a2"}]},
                    {"id": "b", "states": [{"id": "b1"}, {"id": "b2"}]}
                ]}
            ]
        }));
        assert!(doc.is_ok(), "{:?}", doc.err());
    }

    #[test]
    fn test_always_enabled_transition() {
        assert!(is_structural(Document::from_json(&json!({
            "states": [{"id": "a", "transitions": [{"actions": [{"log": {}}]}]}]
        }))));
    }

    #[test]
    fn test_only_history_children() {
        assert!(is_structural(Document::from_json(&json!({
            "states": [{"id": "a", "states": [{"id": "h", "type": "history"}]}]
        }))));
    }

    #[test]
    fn test_malformed_json() {
        let result = Document::from_json(&json!({"states": "nope"}));
        assert!(matches!(result, Err(ChartError::Json(_))));
    }
}
