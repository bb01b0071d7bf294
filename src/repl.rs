//! Interactive REPL.

use crate::commands::{new_interpreter, parse_json_arg};
use crate::config::Config;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use serde_json::Value;
use statechart_core::{Document, Interpreter, MacrostepOutcome, Notification};
use std::sync::Arc;
use std::time::Duration;

const HELP_TEXT: &str = r#"
Available commands:
  help                    Show this help

  send <event> [payload]  Submit an external event and run to a stable state
  tick <ms>               Advance the virtual clock, releasing delayed events
  active [full]           Show active states (leaves only unless 'full')
  states                  List every state in the document
  history <state>         Show what a history state remembers
  data                    Show the data model
  status                  Show the machine status
  reset                   Start over with a fresh machine

  quit, exit              Exit the REPL
"#;

pub fn run(doc: Arc<Document>, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let title = if doc.name.is_empty() {
        "statechart".to_string()
    } else {
        format!("statechart: {}", doc.name)
    };
    println!("{}", title.bold().cyan());

    let mut interpreter = new_interpreter(Arc::clone(&doc), config);
    println!("{}\n", start(&mut interpreter));

    let rl_config = rustyline::Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(rl_config)?;

    let history_path = config.repl.history_path();
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "statechart>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if line == "reset" {
                    interpreter = new_interpreter(Arc::clone(&doc), config);
                    println!("{}\n", start(&mut interpreter));
                    continue;
                }

                match execute_repl_command(&mut interpreter, line) {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break,
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
    Ok(())
}

fn start(interpreter: &mut Interpreter) -> String {
    interpreter.start();
    interpreter.run_until_stable();
    let mut out = format_notifications(&interpreter.take_notifications());
    out.push_str(&format_active(interpreter, true));
    out
}

fn execute_repl_command(
    interpreter: &mut Interpreter,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd.to_lowercase(), rest.trim()),
        None => (line.to_lowercase(), ""),
    };

    match cmd.as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "send" | "s" => {
            let (event, payload) = match rest.split_once(char::is_whitespace) {
                Some((event, payload)) => (event, parse_json_arg(payload.trim())?),
                None => (rest, Value::Null),
            };
            if event.is_empty() {
                return Ok(Some("Usage: send <event> [payload_json]".to_string()));
            }
            if !interpreter.submit_event(event, payload) {
                return Ok(Some(format!(
                    "{} machine is {}",
                    "Dropped:".yellow(),
                    interpreter.status().as_str()
                )));
            }
            Ok(Some(step(interpreter)))
        }

        "tick" | "t" => {
            let ms: u64 = match rest.parse() {
                Ok(ms) => ms,
                Err(_) => return Ok(Some("Usage: tick <milliseconds>".to_string())),
            };
            let released = interpreter.advance_time(Duration::from_millis(ms));
            let mut out = format!(
                "clock {}ms, {} event(s) released\n",
                interpreter.now().as_millis(),
                released
            );
            out.push_str(&step(interpreter));
            Ok(Some(out))
        }

        "active" | "a" => Ok(Some(format_active(interpreter, rest != "full"))),

        "states" => Ok(Some(interpreter.document_state_names(false).join("\n"))),

        "history" | "h" => {
            if rest.is_empty() {
                return Ok(Some("Usage: history <state>".to_string()));
            }
            let remembered = interpreter.history(rest)?;
            if remembered.is_empty() {
                Ok(Some("(nothing recorded)".dimmed().to_string()))
            } else {
                Ok(Some(remembered.join(", ")))
            }
        }

        "data" | "d" => Ok(Some(format_json(interpreter.data_model()))),

        "status" => {
            let status = interpreter.status().as_str();
            let pending = interpreter.pending_delayed();
            Ok(Some(format!(
                "{} (session {}, {} delayed)",
                status.bold(),
                interpreter.session_id(),
                pending
            )))
        }

        _ => Ok(Some(format!(
            "Unknown command: {}. Type 'help' for available commands.",
            cmd
        ))),
    }
}

/// Runs to a stable state and renders what happened.
fn step(interpreter: &mut Interpreter) -> String {
    let outcome = interpreter.run_until_stable();
    let mut out = format_notifications(&interpreter.take_notifications());
    if outcome == MacrostepOutcome::Pending {
        out.push_str(&format!("{}\n", "microstep limit reached".yellow()));
    }
    out.push_str(&format_active(interpreter, true));
    out
}

fn format_active(interpreter: &Interpreter, compressed: bool) -> String {
    let names = interpreter.active_state_names(compressed);
    let label = if interpreter.is_finished() {
        "finished".green().bold()
    } else {
        "active".bold()
    };
    format!("{}: [{}]", label, names.join(", "))
}

fn format_notifications(notifications: &[Notification]) -> String {
    let mut out = String::new();
    for n in notifications {
        let line = match n {
            Notification::StateChanged { state, active: true } => {
                format!("  {} {}", "+".green(), state)
            }
            Notification::StateChanged {
                state,
                active: false,
            } => format!("  {} {}", "-".red(), state),
            Notification::EventOccurred(event) => {
                format!("  {} {}", "event".dimmed(), event.name.cyan())
            }
            Notification::StableState => continue,
            Notification::Finished => format!("  {}", "finished".green()),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
