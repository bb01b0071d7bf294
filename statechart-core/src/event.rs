//! Events and event descriptor matching.
//!
//! Event names are dot separated (`done.state.top`). A transition's `event`
//! attribute is a whitespace separated list of descriptors; a descriptor
//! matches a name when it is equal to it or is a dot-aligned prefix of it.
//! `*` matches every event, and trailing `.*` / `.` are ignored, so
//! `done.state.*`, `done.state.` and `done.state` are equivalent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the event raised when an action fails.
pub const ERROR_EXECUTION: &str = "error.execution";

/// Prefix of completion events.
pub const DONE_STATE_PREFIX: &str = "done.state.";

/// Which queue an event was delivered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOrigin {
    /// Raised by the machine itself (completion events, `raise`, errors).
    Internal,
    /// Submitted by the host or by a `send` action.
    External,
}

/// An event. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub origin: EventOrigin,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
    /// Id of the `send` action that produced the event, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_id: Option<String>,
}

impl Event {
    pub fn internal(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            origin: EventOrigin::Internal,
            payload,
            send_id: None,
        }
    }

    pub fn external(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            origin: EventOrigin::External,
            payload,
            send_id: None,
        }
    }

    pub fn with_send_id(mut self, id: impl Into<String>) -> Self {
        self.send_id = Some(id.into());
        self
    }

    /// Completion event for the given state name.
    pub fn done_state(state: &str, payload: Value) -> Self {
        Self::internal(format!("{}{}", DONE_STATE_PREFIX, state), payload)
    }

    pub fn is_internal(&self) -> bool {
        self.origin == EventOrigin::Internal
    }

    pub fn is_external(&self) -> bool {
        self.origin == EventOrigin::External
    }
}

/// Returns true if a single descriptor token matches the event name.
pub fn descriptor_matches(descriptor: &str, name: &str) -> bool {
    if descriptor == "*" {
        return true;
    }

    let prefix = descriptor
        .strip_suffix(".*")
        .or_else(|| descriptor.strip_suffix('.'))
        .unwrap_or(descriptor);
    if prefix.is_empty() {
        return false;
    }

    match name.strip_prefix(prefix) {
        Some("") => true,
        Some(rest) => rest.starts_with('.'),
        None => false,
    }
}

/// Returns true if any descriptor of a whitespace separated list matches.
pub fn event_matches(descriptors: &str, name: &str) -> bool {
    descriptors
        .split_whitespace()
        .any(|d| descriptor_matches(d, name))
}
