//! Notification bridge between the interpreter and its observers.
//!
//! The interpreter records [`Notification`]s as plain data while a macrostep
//! runs and hands the whole batch to a [`NotificationRegistry`] once the step
//! is over. Callbacks therefore never observe a half-applied configuration,
//! and an event submitted from a callback waits for the next macrostep.

use crate::document::{Document, StateId};
use crate::error::ChartError;
use crate::event::Event;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Something observable that happened during a macrostep.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A state entered (`active = true`) or left the configuration.
    StateChanged { state: String, active: bool },
    /// An event was dequeued for processing.
    EventOccurred(Event),
    /// Both queues are empty and no eventless transition is enabled.
    StableState,
    /// A top-level final state was entered. Fires once per machine.
    Finished,
}

/// Handle returned by every registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type StateCallback = Box<dyn FnMut(bool)>;
type EventCallback = Box<dyn FnMut(&Event)>;
type SignalCallback = Box<dyn FnMut()>;

struct EventSubscription {
    id: SubscriptionId,
    external_only: bool,
    callback: EventCallback,
}

/// Registered observers, in registration order.
#[derive(Default)]
pub struct NotificationRegistry {
    next_id: u64,
    states: HashMap<StateId, Vec<(SubscriptionId, StateCallback)>>,
    events: Vec<EventSubscription>,
    stable: Vec<(SubscriptionId, SignalCallback)>,
    finished: Vec<(SubscriptionId, SignalCallback)>,
}

impl fmt::Debug for NotificationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationRegistry")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

impl NotificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    /// Registers a callback for a named state's activity changes.
    ///
    /// Fails with `InvalidReference` if the document has no such state.
    pub fn subscribe_state(
        &mut self,
        doc: &Document,
        name: &str,
        callback: impl FnMut(bool) + 'static,
    ) -> Result<SubscriptionId, ChartError> {
        let state = doc
            .find(name)
            .filter(|id| !doc.is_history(*id))
            .ok_or_else(|| ChartError::InvalidReference {
                name: name.to_string(),
            })?;
        let id = self.allocate();
        self.states
            .entry(state)
            .or_default()
            .push((id, Box::new(callback)));
        Ok(id)
    }

    /// Registers a callback for every consumed event, internal or external.
    pub fn on_event(&mut self, callback: impl FnMut(&Event) + 'static) -> SubscriptionId {
        self.add_event(false, Box::new(callback))
    }

    /// Registers a callback for events consumed from the external queue.
    pub fn on_external_event(&mut self, callback: impl FnMut(&Event) + 'static) -> SubscriptionId {
        self.add_event(true, Box::new(callback))
    }

    fn add_event(&mut self, external_only: bool, callback: EventCallback) -> SubscriptionId {
        let id = self.allocate();
        self.events.push(EventSubscription {
            id,
            external_only,
            callback,
        });
        id
    }

    pub fn on_stable_state(&mut self, callback: impl FnMut() + 'static) -> SubscriptionId {
        let id = self.allocate();
        self.stable.push((id, Box::new(callback)));
        id
    }

    pub fn on_finished(&mut self, callback: impl FnMut() + 'static) -> SubscriptionId {
        let id = self.allocate();
        self.finished.push((id, Box::new(callback)));
        id
    }

    /// Removes a subscription.
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscription_count();
        for callbacks in self.states.values_mut() {
            callbacks.retain(|(sub, _)| *sub != id);
        }
        self.states.retain(|_, callbacks| !callbacks.is_empty());
        self.events.retain(|sub| sub.id != id);
        self.stable.retain(|(sub, _)| *sub != id);
        self.finished.retain(|(sub, _)| *sub != id);
        before != self.subscription_count()
    }

    /// Returns the number of active subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.states.values().map(Vec::len).sum::<usize>()
            + self.events.len()
            + self.stable.len()
            + self.finished.len()
    }

    /// Delivers a batch of notifications, in order, to every matching callback.
    pub fn dispatch(&mut self, doc: &Document, batch: &[Notification]) {
        for notification in batch {
            match notification {
                Notification::StateChanged { state, active } => {
                    let Some(id) = doc.find(state) else { continue };
                    if let Some(callbacks) = self.states.get_mut(&id) {
                        for (_, callback) in callbacks.iter_mut() {
                            callback(*active);
                        }
                    }
                }
                Notification::EventOccurred(event) => {
                    for sub in self.events.iter_mut() {
                        if !sub.external_only || event.is_external() {
                            (sub.callback)(event);
                        }
                    }
                }
                Notification::StableState => {
                    for (_, callback) in self.stable.iter_mut() {
                        callback();
                    }
                }
                Notification::Finished => {
                    for (_, callback) in self.finished.iter_mut() {
                        callback();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn doc() -> Document {
        Document::from_json(&json!({
            "states": [
                {"id": "a", "states": [{"id": "a1"}, {"id": "h", "type": "history"}]},
                {"id": "b"}
            ]
        }))
        .unwrap()
    }

    fn changed(state: &str, active: bool) -> Notification {
        Notification::StateChanged {
            state: state.to_string(),
            active,
        }
    }

    #[test]
    fn test_subscribe_state() {
        let doc = doc();
        let mut registry = NotificationRegistry::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = seen.clone();
        let id = registry
            .subscribe_state(&doc, "a1", move |active| sink.borrow_mut().push(active))
            .unwrap();
        assert_eq!(id.to_string(), "sub-1");

        registry.dispatch(
            &doc,
            &[changed("a", true), changed("a1", true), changed("a1", false)],
        );
        assert_eq!(*seen.borrow(), vec![true, false]);
    }

    #[test]
    fn test_subscribe_unknown_state() {
        let doc = doc();
        let mut registry = NotificationRegistry::new();

        let err = registry.subscribe_state(&doc, "nope", |_| {}).unwrap_err();
        assert!(matches!(err, ChartError::InvalidReference { .. }));
        assert!(registry.subscribe_state(&doc, "h", |_| {}).is_err());
        assert_eq!(registry.subscription_count(), 0);
    }

    #[test]
    fn test_event_filters() {
        let doc = doc();
        let mut registry = NotificationRegistry::new();
        let all = Rc::new(RefCell::new(Vec::new()));
        let external = Rc::new(RefCell::new(Vec::new()));

        let sink = all.clone();
        registry.on_event(move |e| sink.borrow_mut().push(e.name.clone()));
        let sink = external.clone();
        registry.on_external_event(move |e| sink.borrow_mut().push(e.name.clone()));

        registry.dispatch(
            &doc,
            &[
                Notification::EventOccurred(Event::internal("i", Value::Null)),
                Notification::EventOccurred(Event::external("x", Value::Null)),
            ],
        );
        assert_eq!(*all.borrow(), vec!["i", "x"]);
        assert_eq!(*external.borrow(), vec!["x"]);
    }

    #[test]
    fn test_unsubscribe() {
        let doc = doc();
        let mut registry = NotificationRegistry::new();
        let count = Rc::new(RefCell::new(0));

        let sink = count.clone();
        let stable = registry.on_stable_state(move || *sink.borrow_mut() += 1);
        let state = registry.subscribe_state(&doc, "b", |_| {}).unwrap();
        let finished = registry.on_finished(|| {});
        assert_eq!(registry.subscription_count(), 3);

        registry.dispatch(&doc, &[Notification::StableState]);
        assert!(registry.unsubscribe(stable));
        assert!(!registry.unsubscribe(stable)); // Already removed
        registry.dispatch(&doc, &[Notification::StableState]);
        assert_eq!(*count.borrow(), 1);

        assert!(registry.unsubscribe(state));
        assert!(registry.unsubscribe(finished));
        assert_eq!(registry.subscription_count(), 0);
    }

    #[test]
    fn test_notification_json() {
        let value = serde_json::to_value(changed("a1", true)).unwrap();
        assert_eq!(value, json!({"type": "state_changed", "state": "a1", "active": true}));

        let value =
            serde_json::to_value(Notification::EventOccurred(Event::external("go", json!(1))))
                .unwrap();
        assert_eq!(value["type"], "event_occurred");
        assert_eq!(value["name"], "go");
        assert_eq!(value["origin"], "external");

        let value = serde_json::to_value(Notification::Finished).unwrap();
        assert_eq!(value, json!({"type": "finished"}));
    }
}
