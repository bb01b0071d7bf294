//! One-shot command implementations.

use crate::config::Config;
use colored::Colorize;
use serde_json::{json, Value};
use statechart_core::{Document, Interpreter, JsonEvaluator, Notification};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Loads a statechart document from a JSON or YAML file.
pub fn load_document(path: &Path) -> Result<Arc<Document>, Box<dyn Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read '{}': {}", path.display(), e))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let json: Value = if is_yaml {
        serde_yaml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };

    let doc = Document::from_json(&json)?;
    tracing::debug!(
        "Loaded document '{}' ({} states, checksum {})",
        doc.name,
        doc.len(),
        doc.checksum
    );
    Ok(Arc::new(doc))
}

/// Creates an interpreter for `doc` using the configured options.
pub fn new_interpreter(doc: Arc<Document>, config: &Config) -> Interpreter {
    Interpreter::with_options(doc, JsonEvaluator::new(), config.interpreter.options())
}

/// Parses `name` or `name=<json>` into an event name and payload.
pub fn parse_event_arg(arg: &str) -> Result<(String, Value), Box<dyn Error>> {
    let (name, payload) = match arg.split_once('=') {
        Some((name, data)) => (name.trim(), parse_json_arg(data)?),
        None => (arg.trim(), Value::Null),
    };
    if name.is_empty() {
        return Err(format!("missing event name in '{}'", arg).into());
    }
    Ok((name.to_string(), payload))
}

/// Parses a JSON argument. A leading `@` reads the JSON from a file.
pub fn parse_json_arg(s: &str) -> Result<Value, Box<dyn Error>> {
    if let Some(path) = s.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(s)?)
    }
}

pub fn validate(path: &Path) -> Result<String, Box<dyn Error>> {
    let doc = load_document(path)?;
    let name = if doc.name.is_empty() {
        path.display().to_string()
    } else {
        doc.name.clone()
    };
    Ok(format!(
        "{} {} ({} states, checksum {})",
        "valid".green(),
        name,
        doc.len().saturating_sub(1),
        doc.checksum
    ))
}

/// Lists the configuration a freshly started machine settles into.
pub fn names(path: &Path, compressed: bool, config: &Config) -> Result<String, Box<dyn Error>> {
    let doc = load_document(path)?;
    let mut interpreter = new_interpreter(doc, config);
    interpreter.start();
    interpreter.run_until_stable();
    Ok(interpreter.active_state_names(compressed).join("\n"))
}

/// Starts a machine, feeds it `events` in order and prints every
/// notification as one JSON line, followed by a summary line.
pub fn run(
    path: &Path,
    events: &[String],
    advance_ms: Option<u64>,
    compressed: bool,
    config: &Config,
) -> Result<String, Box<dyn Error>> {
    let parsed = events
        .iter()
        .map(|e| parse_event_arg(e))
        .collect::<Result<Vec<_>, _>>()?;

    let doc = load_document(path)?;
    let mut interpreter = new_interpreter(doc, config);
    let mut lines = Vec::new();

    interpreter.start();
    interpreter.run_until_stable();
    push_notifications(&mut lines, interpreter.take_notifications())?;

    for (name, payload) in parsed {
        if !interpreter.submit_event(&name, payload) {
            tracing::warn!("Event '{}' dropped: machine is {}", name, interpreter.status().as_str());
            continue;
        }
        interpreter.run_until_stable();
        push_notifications(&mut lines, interpreter.take_notifications())?;
    }

    if let Some(ms) = advance_ms {
        let released = interpreter.advance_time(Duration::from_millis(ms));
        tracing::debug!("Advanced clock by {}ms, {} delayed event(s) released", ms, released);
        interpreter.run_until_stable();
        push_notifications(&mut lines, interpreter.take_notifications())?;
    }

    let summary = json!({
        "type": "summary",
        "status": interpreter.status(),
        "active": interpreter.active_state_names(compressed),
        "data": interpreter.data_model(),
    });
    lines.push(serde_json::to_string(&summary)?);
    Ok(lines.join("\n"))
}

fn push_notifications(
    lines: &mut Vec<String>,
    notifications: Vec<Notification>,
) -> Result<(), Box<dyn Error>> {
    for n in notifications {
        lines.push(serde_json::to_string(&n)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TRAFFIC_LIGHT: &str = r#"{
        "name": "light",
        "states": [
            {"id": "red", "transitions": [{"event": "next", "target": "green"}]},
            {"id": "green", "transitions": [{"event": "next", "target": "done"}]},
            {"id": "done", "type": "final"}
        ]
    }"#;

    fn write_doc(content: &str, suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    fn plain() -> Config {
        colored::control::set_override(false);
        Config::default()
    }

    #[test]
    fn test_parse_event_arg() {
        assert_eq!(parse_event_arg("go").unwrap(), ("go".to_string(), Value::Null));
        assert_eq!(
            parse_event_arg("pay={\"amount\": 5}").unwrap(),
            ("pay".to_string(), json!({"amount": 5}))
        );
        assert!(parse_event_arg("=1").is_err());
        assert!(parse_event_arg("pay={broken").is_err());
    }

    #[test]
    fn test_validate_reports_state_count() {
        let _ = plain();
        let file = write_doc(TRAFFIC_LIGHT, ".json");
        let out = validate(file.path()).unwrap();
        assert!(out.contains("light"));
        assert!(out.contains("3 states"));
    }

    #[test]
    fn test_validate_rejects_bad_target() {
        let file = write_doc(
            r#"{"states": [{"id": "a", "transitions": [{"event": "x", "target": "nowhere"}]}]}"#,
            ".json",
        );
        assert!(validate(file.path()).is_err());
    }

    #[test]
    fn test_yaml_document() {
        let yaml = "name: tiny\nstates:\n  - id: only\n";
        let file = write_doc(yaml, ".yaml");
        let out = names(file.path(), true, &plain()).unwrap();
        assert_eq!(out, "only");
    }

    #[test]
    fn test_run_prints_notifications_and_summary() {
        let file = write_doc(TRAFFIC_LIGHT, ".json");
        let out = run(
            file.path(),
            &["next".to_string(), "next".to_string(), "next".to_string()],
            None,
            true,
            &plain(),
        )
        .unwrap();

        let lines: Vec<Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let summary = lines.last().unwrap();
        assert_eq!(summary["type"], "summary");
        assert_eq!(summary["status"], "finished");
        assert_eq!(summary["active"], json!(["done"]));

        assert_eq!(lines[0], json!({"type": "state_changed", "state": "red", "active": true}));
        assert!(lines.iter().any(|l| l["type"] == "finished"));
        let occurred = lines.iter().filter(|l| l["type"] == "event_occurred").count();
        assert_eq!(occurred, 2);
    }
}
