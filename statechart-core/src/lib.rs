//! # statechart-core
//!
//! Statechart interpreter with SCXML run-to-completion semantics.
//!
//! This crate provides:
//! - Document model: an arena of states and transitions, validated at load
//! - Configuration: the active state set plus history records
//! - Event queues: internal, external and delayed (virtual clock)
//! - Interpreter: macrostep/microstep engine with completion events
//! - Notification bridge: per-state, event, stable and finished callbacks
//! - A default evaluator over a JSON data model with a small guard language

pub mod configuration;
pub mod document;
pub mod error;
pub mod evaluator;
pub mod event;
pub mod guard;
pub mod interpreter;
pub mod notify;
pub mod queue;

pub use configuration::Configuration;
pub use document::{Action, Document, StateId, StateKind, TransitionId};
pub use error::{ChartError, EvaluationError};
pub use evaluator::{ActionContext, Effect, Evaluator, JsonEvaluator, Scope};
pub use event::{Event, EventOrigin};
pub use guard::GuardExpr;
pub use interpreter::{Interpreter, InterpreterOptions, MacrostepOutcome, Status};
pub use notify::{Notification, NotificationRegistry, SubscriptionId};
pub use queue::EventSender;
