//! Internal and external event queues.
//!
//! Both queues are FIFO. Delayed sends wait on a virtual clock that only moves
//! when the host calls [`EventQueue::advance`]; due events join the external
//! queue in due-time order, ties broken by submission order.
//!
//! Events submitted through an [`EventSender`] land in a shared inbox and are
//! moved onto the external queue when the interpreter next looks at it, so a
//! submission made from inside a notification callback is never observed
//! mid-step.

use crate::event::Event;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct Inbox {
    events: Mutex<VecDeque<Event>>,
    closed: AtomicBool,
}

/// Cloneable handle for submitting external events.
#[derive(Debug, Clone)]
pub struct EventSender {
    inbox: Arc<Inbox>,
}

impl EventSender {
    /// Queues an external event. Returns false if the machine no longer
    /// accepts events (finished or halted); the event is dropped.
    pub fn send(&self, event: Event) -> bool {
        if self.inbox.closed.load(Ordering::Acquire) {
            tracing::debug!(event = %event.name, "dropping event submitted to a stopped machine");
            return false;
        }
        self.inbox.events.lock().push_back(event);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.inbox.closed.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
struct Delayed {
    due: Duration,
    seq: u64,
    id: Option<String>,
    event: Event,
}

/// Internal, external and delayed event storage of one interpreter.
#[derive(Debug, Default)]
pub struct EventQueue {
    internal: VecDeque<Event>,
    external: VecDeque<Event>,
    delayed: Vec<Delayed>,
    inbox: Arc<Inbox>,
    now: Duration,
    seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            inbox: self.inbox.clone(),
        }
    }

    pub fn push_internal(&mut self, event: Event) {
        self.internal.push_back(event);
    }

    pub fn push_external(&mut self, event: Event) {
        self.collect_inbox();
        self.external.push_back(event);
    }

    pub fn pop_internal(&mut self) -> Option<Event> {
        self.internal.pop_front()
    }

    pub fn pop_external(&mut self) -> Option<Event> {
        self.collect_inbox();
        self.external.pop_front()
    }

    pub fn has_internal(&self) -> bool {
        !self.internal.is_empty()
    }

    pub fn has_external(&self) -> bool {
        !self.external.is_empty() || !self.inbox.events.lock().is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_internal() && !self.has_external()
    }

    /// Parks an event until the virtual clock reaches `now + delay`.
    /// A zero delay queues it immediately.
    pub fn schedule(&mut self, event: Event, delay: Duration, id: Option<String>) {
        if delay.is_zero() {
            self.push_external(event);
            return;
        }
        self.seq += 1;
        self.delayed.push(Delayed {
            due: self.now + delay,
            seq: self.seq,
            id,
            event,
        });
    }

    /// Removes pending delayed sends with the given id. Returns true if any
    /// were removed.
    pub fn cancel(&mut self, id: &str) -> bool {
        let before = self.delayed.len();
        self.delayed.retain(|d| d.id.as_deref() != Some(id));
        before != self.delayed.len()
    }

    /// Moves the virtual clock forward and queues every send that became
    /// due. Returns the number of events queued.
    pub fn advance(&mut self, by: Duration) -> usize {
        self.now += by;
        let now = self.now;

        let (mut due, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.delayed)
                .into_iter()
                .partition(|d| d.due <= now);
        self.delayed = pending;

        due.sort_by_key(|d| (d.due, d.seq));
        let count = due.len();
        self.collect_inbox();
        self.external.extend(due.into_iter().map(|d| d.event));
        count
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn pending_delayed(&self) -> usize {
        self.delayed.len()
    }

    /// Drops everything queued and refuses further submissions.
    pub fn close(&mut self) -> usize {
        self.inbox.closed.store(true, Ordering::Release);
        let dropped = self.internal.len()
            + self.external.len()
            + self.delayed.len()
            + self.inbox.events.lock().len();
        self.internal.clear();
        self.external.clear();
        self.delayed.clear();
        self.inbox.events.lock().clear();
        dropped
    }

    fn collect_inbox(&mut self) {
        let mut inbox = self.inbox.events.lock();
        self.external.extend(inbox.drain(..));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn ext(name: &str) -> Event {
        Event::external(name, Value::Null)
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = EventQueue::new();
        queue.push_external(ext("a"));
        queue.push_external(ext("b"));
        queue.push_internal(Event::internal("i1", Value::Null));
        queue.push_internal(Event::internal("i2", Value::Null));

        assert_eq!(queue.pop_internal().unwrap().name, "i1");
        assert_eq!(queue.pop_internal().unwrap().name, "i2");
        assert!(queue.pop_internal().is_none());
        assert_eq!(queue.pop_external().unwrap().name, "a");
        assert_eq!(queue.pop_external().unwrap().name, "b");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_sender_goes_through_inbox() {
        let mut queue = EventQueue::new();
        let sender = queue.sender();
        queue.push_external(ext("first"));
        assert!(sender.send(ext("second")));

        assert!(queue.has_external());
        assert_eq!(queue.pop_external().unwrap().name, "first");
        assert_eq!(queue.pop_external().unwrap().name, "second");
    }

    #[test]
    fn test_delayed_events() {
        let mut queue = EventQueue::new();
        queue.schedule(ext("late"), Duration::from_millis(200), None);
        queue.schedule(ext("early"), Duration::from_millis(100), None);
        queue.schedule(ext("now"), Duration::ZERO, None);

        assert_eq!(queue.pending_delayed(), 2);
        assert_eq!(queue.pop_external().unwrap().name, "now");

        assert_eq!(queue.advance(Duration::from_millis(50)), 0);
        assert_eq!(queue.advance(Duration::from_millis(200)), 2);
        assert_eq!(queue.now(), Duration::from_millis(250));
        assert_eq!(queue.pop_external().unwrap().name, "early");
        assert_eq!(queue.pop_external().unwrap().name, "late");
    }

    #[test]
    fn test_same_due_time_keeps_submission_order() {
        let mut queue = EventQueue::new();
        queue.schedule(ext("x"), Duration::from_millis(10), None);
        queue.schedule(ext("y"), Duration::from_millis(10), None);
        queue.advance(Duration::from_millis(10));
        assert_eq!(queue.pop_external().unwrap().name, "x");
        assert_eq!(queue.pop_external().unwrap().name, "y");
    }

    #[test]
    fn test_cancel() {
        let mut queue = EventQueue::new();
        queue.schedule(ext("t"), Duration::from_millis(10), Some("t1".to_string()));
        queue.schedule(ext("u"), Duration::from_millis(10), Some("t2".to_string()));

        assert!(queue.cancel("t1"));
        assert!(!queue.cancel("t1"));
        queue.advance(Duration::from_millis(10));
        assert_eq!(queue.pop_external().unwrap().name, "u");
        assert!(queue.pop_external().is_none());
    }

    #[test]
    fn test_close_drops_everything() {
        let mut queue = EventQueue::new();
        let sender = queue.sender();
        queue.push_internal(Event::internal("i", Value::Null));
        queue.push_external(ext("e"));
        queue.schedule(ext("d"), Duration::from_secs(1), None);
        sender.send(ext("s"));

        assert_eq!(queue.close(), 4);
        assert!(queue.is_empty());
        assert!(!sender.send(ext("late")));
        assert!(sender.is_closed());
        assert!(queue.pop_external().is_none());
    }
}
