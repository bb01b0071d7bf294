//! Expression evaluator contract and the default JSON evaluator.
//!
//! The interpreter never interprets guards or executable content itself: it
//! hands them to an [`Evaluator`] together with the data model and applies the
//! returned [`Effect`]s to its queues.

use crate::document::Action;
use crate::error::EvaluationError;
use crate::event::Event;
use crate::guard::{FieldRef, GuardExpr};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Read-only view handed to guard evaluation.
pub struct Scope<'a> {
    /// The data model.
    pub data: &'a Value,
    /// Event being processed, `None` for eventless transitions.
    pub event: Option<&'a Event>,
    in_state: &'a dyn Fn(&str) -> bool,
}

impl<'a> Scope<'a> {
    pub fn new(
        data: &'a Value,
        event: Option<&'a Event>,
        in_state: &'a dyn Fn(&str) -> bool,
    ) -> Self {
        Self {
            data,
            event,
            in_state,
        }
    }

    /// Returns true if the named state is currently active.
    pub fn is_in(&self, state: &str) -> bool {
        (self.in_state)(state)
    }
}

/// Mutable view handed to action execution.
pub struct ActionContext<'a> {
    pub data: &'a mut Value,
    pub event: Option<&'a Event>,
    in_state: &'a dyn Fn(&str) -> bool,
}

impl<'a> ActionContext<'a> {
    pub fn new(
        data: &'a mut Value,
        event: Option<&'a Event>,
        in_state: &'a dyn Fn(&str) -> bool,
    ) -> Self {
        Self {
            data,
            event,
            in_state,
        }
    }

    /// Read-only scope over the same data.
    pub fn scope(&self) -> Scope<'_> {
        Scope::new(self.data, self.event, self.in_state)
    }
}

/// Queue operation requested by executable content.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append to the internal queue.
    Raise(Event),
    /// Append to the external queue, after `delay` on the virtual clock.
    Send {
        event: Event,
        delay: Duration,
        id: Option<String>,
    },
    /// Drop a pending delayed send.
    Cancel(String),
}

/// Evaluates guards and executes actions on behalf of the interpreter.
pub trait Evaluator {
    /// Evaluates a guard. An error means the transition is not enabled.
    fn evaluate_guard(&mut self, expr: &str, scope: &Scope<'_>) -> Result<bool, EvaluationError>;

    /// Executes one action. An error aborts the rest of its block.
    fn execute(
        &mut self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<Vec<Effect>, EvaluationError>;
}

impl<E: Evaluator + ?Sized> Evaluator for Box<E> {
    fn evaluate_guard(&mut self, expr: &str, scope: &Scope<'_>) -> Result<bool, EvaluationError> {
        (**self).evaluate_guard(expr, scope)
    }

    fn execute(
        &mut self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<Vec<Effect>, EvaluationError> {
        (**self).execute(action, ctx)
    }
}

/// Default evaluator over a JSON data model, using the guard language.
#[derive(Debug, Default)]
pub struct JsonEvaluator {
    cache: HashMap<String, GuardExpr>,
}

impl JsonEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&mut self, expr: &str) -> Result<&GuardExpr, EvaluationError> {
        if !self.cache.contains_key(expr) {
            let parsed = GuardExpr::parse(expr)?;
            self.cache.insert(expr.to_string(), parsed);
        }
        Ok(&self.cache[expr])
    }

    /// Evaluates a value expression: a field reference, a JSON literal, or a
    /// guard (yielding a boolean).
    pub fn evaluate_value(
        &mut self,
        expr: &str,
        scope: &Scope<'_>,
    ) -> Result<Value, EvaluationError> {
        if let Ok(field) = FieldRef::parse(expr) {
            return Ok(field.resolve(scope));
        }
        if let Ok(literal) = serde_json::from_str::<Value>(expr) {
            return Ok(literal);
        }
        Ok(Value::Bool(self.guard(expr)?.evaluate(scope)))
    }
}

impl Evaluator for JsonEvaluator {
    fn evaluate_guard(&mut self, expr: &str, scope: &Scope<'_>) -> Result<bool, EvaluationError> {
        Ok(self.guard(expr)?.evaluate(scope))
    }

    fn execute(
        &mut self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<Vec<Effect>, EvaluationError> {
        match action {
            Action::Raise { event, data } => {
                Ok(vec![Effect::Raise(Event::internal(event, data.clone()))])
            }
            Action::Send {
                event,
                data,
                delay_ms,
                id,
            } => {
                let mut event = Event::external(event, data.clone());
                if let Some(id) = id {
                    event = event.with_send_id(id);
                }
                Ok(vec![Effect::Send {
                    event,
                    delay: Duration::from_millis(*delay_ms),
                    id: id.clone(),
                }])
            }
            Action::Cancel { id } => Ok(vec![Effect::Cancel(id.clone())]),
            Action::Assign {
                location,
                value,
                expr,
            } => {
                let new_value = match (value, expr) {
                    (Some(v), _) => v.clone(),
                    (None, Some(expr)) => self.evaluate_value(expr, &ctx.scope())?,
                    (None, None) => Value::Null,
                };
                let path = location.strip_prefix("ctx.").unwrap_or(location);
                set_path(ctx.data, path, new_value)?;
                Ok(Vec::new())
            }
            Action::Log { label, expr } => {
                let value = match expr {
                    Some(expr) => self.evaluate_value(expr, &ctx.scope())?,
                    None => Value::Null,
                };
                tracing::info!(
                    label = label.as_deref().unwrap_or(""),
                    value = %value,
                    "log"
                );
                Ok(Vec::new())
            }
        }
    }
}

/// Writes `value` at a dotted path, creating intermediate objects.
fn set_path(root: &mut Value, path: &str, value: Value) -> Result<(), EvaluationError> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(EvaluationError::new(format!(
            "invalid assign location '{}'",
            path
        )));
    }
    let Some((last, init)) = segments.split_last() else {
        return Err(EvaluationError::new("empty assign location"));
    };

    let mut current = root;
    for segment in init {
        let map = current.as_object_mut().ok_or_else(|| {
            EvaluationError::new(format!(
                "cannot assign '{}': '{}' is not an object",
                path, segment
            ))
        })?;
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }

    let map = current.as_object_mut().ok_or_else(|| {
        EvaluationError::new(format!(
            "cannot assign '{}': parent of '{}' is not an object",
            path, last
        ))
    })?;
    map.insert(last.to_string(), value);
    Ok(())
}
