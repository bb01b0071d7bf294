//! Statechart interpreter - drives a document through macrosteps.
//!
//! A macrostep first settles the machine (eventless transitions and internal
//! events until neither applies), then consumes at most one external event
//! and settles again. Each round of transition selection plus its exit and
//! entry bookkeeping is a microstep.
//!
//! Transition selection walks the active atomic states in document order and,
//! for each, its ancestors from the inside out, taking the first enabled
//! transition found. Selected transitions whose exit sets overlap conflict;
//! the one with the deeper source wins, otherwise the earlier one.
//!
//! Nothing here is asynchronous. The host calls [`Interpreter::run_macrostep`]
//! (or [`Interpreter::run_until_stable`]) after submitting events, and
//! [`Interpreter::advance_time`] to release delayed sends.

use crate::configuration::Configuration;
use crate::document::{
    Action, Document, HistoryDepth, StateId, StateKind, TransitionId, TransitionKind,
};
use crate::error::ChartError;
use crate::evaluator::{ActionContext, Effect, Evaluator, JsonEvaluator, Scope};
use crate::event::{event_matches, Event, ERROR_EXECUTION};
use crate::notify::{Notification, NotificationRegistry, SubscriptionId};
use crate::queue::{EventQueue, EventSender};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Default bound on microsteps per macrostep.
pub const DEFAULT_MAX_MICROSTEPS: usize = 10_000;

/// Interpreter tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterOptions {
    /// Microsteps (eventless rounds plus internal events) allowed in one
    /// macrostep before the interpreter yields with [`MacrostepOutcome::Pending`].
    pub max_microsteps: usize,
    /// Keep dispatched notifications for [`Interpreter::take_notifications`].
    pub keep_log: bool,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            max_microsteps: DEFAULT_MAX_MICROSTEPS,
            keep_log: true,
        }
    }
}

/// Lifecycle of an interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    NotStarted,
    Running,
    /// A top-level final state was entered.
    Finished,
    /// Stopped by the host.
    Halted,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotStarted => "not_started",
            Status::Running => "running",
            Status::Finished => "finished",
            Status::Halted => "halted",
        }
    }
}

/// How a macrostep ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacrostepOutcome {
    /// Queues are empty and no eventless transition is enabled.
    Stable,
    /// Work remains: more external events, or the microstep limit was hit.
    Pending,
    /// The machine finished during this macrostep.
    Finished,
    /// Nothing ran because the machine is not running.
    Idle,
}

/// States to enter in one microstep.
#[derive(Debug, Default)]
struct EntrySet {
    states: BTreeSet<StateId>,
    /// History default transitions to run after their parent's onentry.
    history_content: HashMap<StateId, TransitionId>,
}

/// A running statechart.
pub struct Interpreter<E = JsonEvaluator> {
    doc: Arc<Document>,
    evaluator: E,
    options: InterpreterOptions,
    config: Configuration,
    queue: EventQueue,
    data: Value,
    status: Status,
    registry: NotificationRegistry,
    /// Notifications of the macrostep in progress.
    pending: Vec<Notification>,
    log: Vec<Notification>,
    session_id: Uuid,
    budget_exhausted: bool,
}

impl<E> fmt::Debug for Interpreter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("session_id", &self.session_id)
            .field("document", &self.doc.name)
            .field("status", &self.status)
            .field("active", &self.config.active_state_names(&self.doc, true))
            .finish()
    }
}

impl<E: Evaluator> Interpreter<E> {
    pub fn new(doc: Arc<Document>, evaluator: E) -> Self {
        Self::with_options(doc, evaluator, InterpreterOptions::default())
    }

    pub fn with_options(doc: Arc<Document>, evaluator: E, options: InterpreterOptions) -> Self {
        let data = doc.datamodel.clone();
        Self {
            doc,
            evaluator,
            options,
            config: Configuration::new(),
            queue: EventQueue::new(),
            data,
            status: Status::NotStarted,
            registry: NotificationRegistry::new(),
            pending: Vec::new(),
            log: Vec::new(),
            session_id: Uuid::new_v4(),
            budget_exhausted: false,
        }
    }

    fn span(&self) -> tracing::Span {
        tracing::debug_span!("statechart", session = %self.session_id, machine = %self.doc.name)
    }

    /// Enters the document's initial configuration and runs the first
    /// macrostep. Events submitted before `start` are processed afterwards.
    pub fn start(&mut self) -> MacrostepOutcome {
        if self.status != Status::NotStarted {
            tracing::warn!(
                "start ignored: statechart '{}' is already {}",
                self.doc.name,
                self.status.as_str()
            );
            return MacrostepOutcome::Idle;
        }
        let _span = self.span().entered();
        tracing::info!("starting statechart '{}'", self.doc.name);

        self.status = Status::Running;
        self.enter_initial();
        let outcome = if self.status == Status::Finished {
            MacrostepOutcome::Finished
        } else {
            self.macrostep()
        };
        self.flush();
        outcome
    }

    /// Queues an external event.
    ///
    /// Returns false, dropping the event, once the machine has finished or
    /// been halted.
    pub fn submit_event(&mut self, name: impl Into<String>, payload: Value) -> bool {
        let event = Event::external(name, payload);
        match self.status {
            Status::Finished | Status::Halted => {
                tracing::debug!(
                    "dropping event '{}' submitted to a {} machine",
                    event.name,
                    self.status.as_str()
                );
                false
            }
            Status::NotStarted | Status::Running => {
                self.queue.push_external(event);
                true
            }
        }
    }

    /// Handle for submitting external events from elsewhere, including from
    /// inside notification callbacks.
    pub fn sender(&self) -> EventSender {
        self.queue.sender()
    }

    /// Runs one macrostep and dispatches its notifications.
    pub fn run_macrostep(&mut self) -> MacrostepOutcome {
        if self.status != Status::Running {
            return MacrostepOutcome::Idle;
        }
        let _span = self.span().entered();
        let outcome = self.macrostep();
        self.flush();
        outcome
    }

    /// Runs macrosteps until the machine is stable, finished, or stuck on
    /// the microstep limit. Events that callbacks submit through an
    /// [`EventSender`] while a batch is dispatched are processed too.
    pub fn run_until_stable(&mut self) -> MacrostepOutcome {
        loop {
            let outcome = self.run_macrostep();
            let more = match outcome {
                MacrostepOutcome::Pending => !self.budget_exhausted,
                MacrostepOutcome::Stable => self.queue.has_external(),
                MacrostepOutcome::Finished | MacrostepOutcome::Idle => false,
            };
            if !more {
                return outcome;
            }
        }
    }

    /// Moves the virtual clock forward. Delayed sends that become due are
    /// queued as external events; returns how many.
    pub fn advance_time(&mut self, by: Duration) -> usize {
        if self.status != Status::Running {
            return 0;
        }
        let released = self.queue.advance(by);
        if released > 0 {
            tracing::debug!(
                "{} delayed event(s) due at {}ms",
                released,
                self.queue.now().as_millis()
            );
        }
        released
    }

    /// Stops the machine between macrosteps. Queued and delayed events are
    /// discarded; the configuration is kept for inspection.
    ///
    /// Returns false if the machine had already stopped.
    pub fn halt(&mut self) -> bool {
        match self.status {
            Status::NotStarted | Status::Running => {
                self.status = Status::Halted;
                let dropped = self.queue.close();
                tracing::info!(
                    "statechart '{}' halted ({} queued events discarded)",
                    self.doc.name,
                    dropped
                );
                true
            }
            Status::Finished | Status::Halted => false,
        }
    }

    pub fn active_state_names(&self, compressed: bool) -> Vec<String> {
        self.config.active_state_names(&self.doc, compressed)
    }

    pub fn document_state_names(&self, compressed: bool) -> Vec<String> {
        self.doc.state_names(compressed)
    }

    /// Returns whether the named state is active.
    pub fn is_active(&self, name: &str) -> Result<bool, ChartError> {
        let id = self.lookup(name)?;
        Ok(self.config.is_active(id))
    }

    pub fn is_finished(&self) -> bool {
        self.status == Status::Finished
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// States recorded by a history pseudo-state, empty if its parent has
    /// never been exited.
    pub fn history(&self, name: &str) -> Result<Vec<String>, ChartError> {
        let id = self.lookup(name)?;
        if !self.doc.is_history(id) {
            return Err(ChartError::NotHistoryState {
                name: name.to_string(),
            });
        }
        Ok(self
            .config
            .history_of(id)
            .unwrap_or_default()
            .iter()
            .map(|s| self.doc.name_of(*s).to_string())
            .collect())
    }

    pub fn data_model(&self) -> &Value {
        &self.data
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.doc
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.queue.now()
    }

    pub fn pending_delayed(&self) -> usize {
        self.queue.pending_delayed()
    }

    fn lookup(&self, name: &str) -> Result<StateId, ChartError> {
        self.doc
            .find(name)
            .ok_or_else(|| ChartError::InvalidReference {
                name: name.to_string(),
            })
    }

    // Subscriptions

    pub fn subscribe_state(
        &mut self,
        name: &str,
        callback: impl FnMut(bool) + 'static,
    ) -> Result<SubscriptionId, ChartError> {
        self.registry.subscribe_state(&self.doc, name, callback)
    }

    pub fn on_event(&mut self, callback: impl FnMut(&Event) + 'static) -> SubscriptionId {
        self.registry.on_event(callback)
    }

    pub fn on_external_event(&mut self, callback: impl FnMut(&Event) + 'static) -> SubscriptionId {
        self.registry.on_external_event(callback)
    }

    pub fn on_stable_state(&mut self, callback: impl FnMut() + 'static) -> SubscriptionId {
        self.registry.on_stable_state(callback)
    }

    pub fn on_finished(&mut self, callback: impl FnMut() + 'static) -> SubscriptionId {
        self.registry.on_finished(callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id)
    }

    /// Drains the notifications dispatched since the last call.
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.log)
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.pending);
        self.registry.dispatch(&self.doc, &batch);
        if self.options.keep_log {
            self.log.extend(batch);
        }
    }

    // Macrostep

    fn macrostep(&mut self) -> MacrostepOutcome {
        self.budget_exhausted = false;
        let mut budget = self.options.max_microsteps;

        if let Some(outcome) = self.settle(&mut budget) {
            return outcome;
        }
        let Some(event) = self.queue.pop_external() else {
            return self.stable();
        };

        tracing::debug!("processing external event '{}'", event.name);
        self.pending.push(Notification::EventOccurred(event.clone()));
        let enabled = self.select_transitions(Some(&event));
        if !enabled.is_empty() {
            self.microstep(&enabled, Some(&event));
        }

        if let Some(outcome) = self.settle(&mut budget) {
            return outcome;
        }
        if self.queue.has_external() {
            MacrostepOutcome::Pending
        } else {
            self.stable()
        }
    }

    fn stable(&mut self) -> MacrostepOutcome {
        self.pending.push(Notification::StableState);
        MacrostepOutcome::Stable
    }

    /// Takes eventless transitions and internal events until neither applies.
    /// Returns `Some` if the macrostep must end here.
    fn settle(&mut self, budget: &mut usize) -> Option<MacrostepOutcome> {
        loop {
            if self.status == Status::Finished {
                return Some(MacrostepOutcome::Finished);
            }

            let enabled = self.select_transitions(None);
            if !enabled.is_empty() {
                if !self.spend(budget) {
                    return Some(MacrostepOutcome::Pending);
                }
                self.microstep(&enabled, None);
                continue;
            }

            if !self.queue.has_internal() {
                return None;
            }
            if !self.spend(budget) {
                return Some(MacrostepOutcome::Pending);
            }
            let event = self.queue.pop_internal()?;
            tracing::debug!("processing internal event '{}'", event.name);
            self.pending.push(Notification::EventOccurred(event.clone()));
            let enabled = self.select_transitions(Some(&event));
            if !enabled.is_empty() {
                self.microstep(&enabled, Some(&event));
            }
        }
    }

    fn spend(&mut self, budget: &mut usize) -> bool {
        if *budget == 0 {
            tracing::warn!(
                "statechart '{}' hit the limit of {} microsteps in one macrostep",
                self.doc.name,
                self.options.max_microsteps
            );
            self.budget_exhausted = true;
            return false;
        }
        *budget -= 1;
        true
    }

    // Transition selection

    fn select_transitions(&mut self, event: Option<&Event>) -> Vec<TransitionId> {
        let doc = Arc::clone(&self.doc);
        let atomic: Vec<StateId> = self.config.atomic_states(&doc).collect();

        let mut enabled: Vec<TransitionId> = Vec::new();
        for state in atomic {
            'outward: for s in std::iter::once(state).chain(doc.proper_ancestors(state, None)) {
                for &tid in &doc.node(s).transitions {
                    let matches = match (event, doc.transition(tid).event.as_deref()) {
                        (None, None) => true,
                        (Some(event), Some(descriptors)) => event_matches(descriptors, &event.name),
                        _ => false,
                    };
                    if matches && self.guard_enabled(tid, event) {
                        if !enabled.contains(&tid) {
                            enabled.push(tid);
                        }
                        break 'outward;
                    }
                }
            }
        }

        self.remove_conflicts(&doc, enabled)
    }

    fn guard_enabled(&mut self, tid: TransitionId, event: Option<&Event>) -> bool {
        let doc = Arc::clone(&self.doc);
        let transition = doc.transition(tid);
        let Some(cond) = transition.cond.as_deref() else {
            return true;
        };

        let config = &self.config;
        let in_state = |name: &str| doc.find(name).is_some_and(|id| config.is_active(id));
        let scope = Scope::new(&self.data, event, &in_state);
        match self.evaluator.evaluate_guard(cond, &scope) {
            Ok(enabled) => enabled,
            Err(e) => {
                tracing::warn!(
                    "guard '{}' on state '{}' failed, treating as false: {}",
                    cond,
                    doc.name_of(transition.source),
                    e
                );
                false
            }
        }
    }

    /// Drops transitions whose exit sets overlap an already kept one. A
    /// transition from a descendant source replaces the kept one.
    fn remove_conflicts(&self, doc: &Document, enabled: Vec<TransitionId>) -> Vec<TransitionId> {
        let mut kept: Vec<(TransitionId, BTreeSet<StateId>)> = Vec::new();
        for t1 in enabled {
            let exit1 = self.compute_exit_set(doc, &[t1]);
            let source1 = doc.transition(t1).source;
            let mut preempted = false;
            let mut replaced = Vec::new();

            for (t2, exit2) in &kept {
                if exit1.is_disjoint(exit2) {
                    continue;
                }
                if doc.is_descendant(source1, doc.transition(*t2).source) {
                    replaced.push(*t2);
                } else {
                    preempted = true;
                    break;
                }
            }

            if preempted {
                tracing::debug!(
                    "transition from '{}' preempted by a conflicting transition",
                    doc.name_of(source1)
                );
                continue;
            }
            kept.retain(|(t, _)| !replaced.contains(t));
            kept.push((t1, exit1));
        }
        kept.into_iter().map(|(t, _)| t).collect()
    }

    // Exit and entry sets

    fn compute_exit_set(&self, doc: &Document, transitions: &[TransitionId]) -> BTreeSet<StateId> {
        let mut exit = BTreeSet::new();
        for &tid in transitions {
            let Some(domain) = self.transition_domain(doc, tid) else {
                continue;
            };
            exit.extend(self.config.iter().filter(|s| doc.is_descendant(*s, domain)));
        }
        exit
    }

    /// The state whose descendants a transition exits and enters. `None` for
    /// targetless transitions.
    fn transition_domain(&self, doc: &Document, tid: TransitionId) -> Option<StateId> {
        let transition = doc.transition(tid);
        let targets = self.effective_targets(doc, tid);
        if targets.is_empty() {
            return None;
        }

        let source = transition.source;
        if transition.kind == TransitionKind::Internal
            && doc.is_compound(source)
            && targets.iter().all(|t| doc.is_descendant(*t, source))
        {
            return Some(source);
        }

        // Least common compound ancestor of source and targets.
        let lcca = doc
            .proper_ancestors(source, None)
            .into_iter()
            .filter(|a| doc.is_compound(*a))
            .find(|a| targets.iter().all(|t| doc.is_descendant(*t, *a)));
        Some(lcca.unwrap_or(StateId::ROOT))
    }

    /// Targets with history pseudo-states replaced by what they stand for.
    fn effective_targets(&self, doc: &Document, tid: TransitionId) -> Vec<StateId> {
        let mut targets = Vec::new();
        for &t in &doc.transition(tid).targets {
            let resolved: Vec<StateId> = if doc.is_history(t) {
                match self.config.history_of(t) {
                    Some(recorded) => recorded.to_vec(),
                    None => doc
                        .node(t)
                        .history_default
                        .map(|d| doc.transition(d).targets.clone())
                        .unwrap_or_default(),
                }
            } else {
                vec![t]
            };
            for s in resolved {
                if !targets.contains(&s) {
                    targets.push(s);
                }
            }
        }
        targets
    }

    fn compute_entry_set(&self, doc: &Document, transitions: &[TransitionId]) -> EntrySet {
        let mut entry = EntrySet::default();
        for &tid in transitions {
            for &target in &doc.transition(tid).targets {
                self.add_descendants(doc, target, &mut entry);
            }
            let Some(domain) = self.transition_domain(doc, tid) else {
                continue;
            };
            for target in self.effective_targets(doc, tid) {
                self.add_ancestors(doc, target, domain, &mut entry);
            }
        }
        entry
    }

    fn add_descendants(&self, doc: &Document, state: StateId, entry: &mut EntrySet) {
        if doc.is_history(state) {
            let parent = doc.parent(state).unwrap_or(StateId::ROOT);
            let targets = match self.config.history_of(state) {
                Some(recorded) => recorded.to_vec(),
                None => match doc.node(state).history_default {
                    Some(default) => {
                        entry.history_content.insert(parent, default);
                        doc.transition(default).targets.clone()
                    }
                    None => Vec::new(),
                },
            };
            for &s in &targets {
                self.add_descendants(doc, s, entry);
            }
            for &s in &targets {
                self.add_ancestors(doc, s, parent, entry);
            }
            return;
        }

        entry.states.insert(state);
        match doc.kind(state) {
            StateKind::Compound => {
                let initial = &doc.node(state).initial;
                for &s in initial {
                    self.add_descendants(doc, s, entry);
                }
                for &s in initial {
                    self.add_ancestors(doc, s, state, entry);
                }
            }
            StateKind::Parallel => self.add_regions(doc, state, entry),
            StateKind::Atomic | StateKind::Final | StateKind::History(_) => {}
        }
    }

    fn add_ancestors(&self, doc: &Document, state: StateId, ancestor: StateId, entry: &mut EntrySet) {
        for a in doc.proper_ancestors(state, Some(ancestor)) {
            if a == StateId::ROOT {
                break;
            }
            entry.states.insert(a);
            if doc.is_parallel(a) {
                self.add_regions(doc, a, entry);
            }
        }
    }

    /// Default-enters every region of a parallel state that nothing entered yet.
    fn add_regions(&self, doc: &Document, parallel: StateId, entry: &mut EntrySet) {
        for region in doc.child_states(parallel) {
            if !entry.states.iter().any(|s| doc.is_descendant(*s, region)) {
                self.add_descendants(doc, region, entry);
            }
        }
    }

    // Microstep

    fn microstep(&mut self, enabled: &[TransitionId], event: Option<&Event>) {
        let doc = Arc::clone(&self.doc);
        tracing::debug!(
            "microstep: {} transition(s) on {}",
            enabled.len(),
            event.map_or("<eventless>", |e| e.name.as_str())
        );

        self.exit_states(&doc, enabled, event);
        for &tid in enabled {
            self.execute_block(&doc.transition(tid).actions, event);
        }
        let entry = self.compute_entry_set(&doc, enabled);
        self.enter_states(&doc, entry, event);
    }

    fn exit_states(&mut self, doc: &Document, enabled: &[TransitionId], event: Option<&Event>) {
        let exit = self.compute_exit_set(doc, enabled);

        // History is recorded from the configuration before anything leaves it.
        for &s in &exit {
            for h in doc.history_children(s) {
                let recorded: Vec<StateId> = match doc.kind(h) {
                    StateKind::History(HistoryDepth::Deep) => self
                        .config
                        .iter()
                        .filter(|x| doc.is_atomic(*x) && doc.is_descendant(*x, s))
                        .collect(),
                    _ => self
                        .config
                        .iter()
                        .filter(|x| doc.parent(*x) == Some(s))
                        .collect(),
                };
                self.config.record_history(h, recorded);
            }
        }

        for s in exit.into_iter().rev() {
            self.execute_block(&doc.node(s).on_exit, event);
            self.config.remove(s);
            self.pending.push(Notification::StateChanged {
                state: doc.name_of(s).to_string(),
                active: false,
            });
        }
    }

    fn enter_states(&mut self, doc: &Document, entry: EntrySet, event: Option<&Event>) {
        let mut reached_top_final = false;

        for s in entry.states {
            self.config.insert(s);
            self.pending.push(Notification::StateChanged {
                state: doc.name_of(s).to_string(),
                active: true,
            });
            self.execute_block(&doc.node(s).on_entry, event);
            if let Some(&default) = entry.history_content.get(&s) {
                self.execute_block(&doc.transition(default).actions, event);
            }
            if doc.is_final(s) {
                reached_top_final |= self.complete(doc, s);
            }
        }

        if reached_top_final {
            self.finish();
        }
    }

    /// Raises the completion events for an entered final state. Returns true
    /// if the state is a top-level final.
    fn complete(&mut self, doc: &Document, state: StateId) -> bool {
        let parent = doc.parent(state).unwrap_or(StateId::ROOT);
        if parent == StateId::ROOT {
            return true;
        }

        let payload = doc.node(state).done_data.clone().unwrap_or(Value::Null);
        self.queue
            .push_internal(Event::done_state(doc.name_of(parent), payload));

        if let Some(grandparent) = doc.parent(parent) {
            if doc.is_parallel(grandparent)
                && doc
                    .child_states(grandparent)
                    .all(|region| self.config.is_in_final_state(doc, region))
            {
                self.queue
                    .push_internal(Event::done_state(doc.name_of(grandparent), Value::Null));
            }
        }
        false
    }

    fn enter_initial(&mut self) {
        let doc = Arc::clone(&self.doc);
        let root = doc.root();
        let mut entry = EntrySet::default();
        for &s in &doc.node(root).initial {
            self.add_descendants(&doc, s, &mut entry);
        }
        for &s in &doc.node(root).initial {
            self.add_ancestors(&doc, s, root, &mut entry);
        }
        self.enter_states(&doc, entry, None);
    }

    fn finish(&mut self) {
        self.status = Status::Finished;
        let dropped = self.queue.close();
        tracing::info!(
            "statechart '{}' finished ({} queued events discarded)",
            self.doc.name,
            dropped
        );
        self.pending.push(Notification::Finished);
    }

    // Executable content

    /// Runs an action block. The first failing action ends the block and
    /// raises `error.execution`.
    fn execute_block(&mut self, actions: &[Action], event: Option<&Event>) {
        for action in actions {
            let result = {
                let doc = &self.doc;
                let config = &self.config;
                let in_state = |name: &str| doc.find(name).is_some_and(|id| config.is_active(id));
                let mut ctx = ActionContext::new(&mut self.data, event, &in_state);
                self.evaluator.execute(action, &mut ctx)
            };

            match result {
                Ok(effects) => self.apply(effects),
                Err(e) => {
                    tracing::warn!("action failed: {}", e);
                    self.queue.push_internal(Event::internal(
                        ERROR_EXECUTION,
                        json!({ "reason": e.reason }),
                    ));
                    break;
                }
            }
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Raise(event) => self.queue.push_internal(event),
                Effect::Send { event, delay, id } => self.queue.schedule(event, delay, id),
                Effect::Cancel(id) => {
                    if !self.queue.cancel(&id) {
                        tracing::debug!("cancel: no pending send with id '{}'", id);
                    }
                }
            }
        }
    }
}
