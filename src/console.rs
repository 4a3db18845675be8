//! Adapter console commands
//!
//! Debug console input classified as a command is first offered to these
//! built-ins; anything they do not recognize goes to the engine.
//!
//! - `repl-mode [variable|command|auto]`
//! - `start-debugging <launch|attach> <configuration>`
//! - `send-event <name> [body]`

use serde_json::{json, Value};

use crate::common::{Error, Result};
use crate::engine::DebugEngine;
use crate::session::repl::ReplMode;
use crate::session::Session;

/// Events whose meaning depends on adapter state; clients may not fake them
pub const INTERNAL_EVENTS: &[&str] = &[
    "breakpoint",
    "capabilities",
    "continued",
    "exited",
    "initialize",
    "loadedSource",
    "module",
    "process",
    "stopped",
    "terminated",
    "thread",
];

/// Run `line` if it names a console command
///
/// Returns `None` for anything else. On success the text is the command's
/// console result.
pub async fn run_console_command<E: DebugEngine>(
    session: &mut Session<E>,
    line: &str,
) -> Option<Result<String>> {
    let (name, args) = split_word(line);
    let result = match name {
        "repl-mode" => repl_mode(session, args),
        "start-debugging" => start_debugging(session, args).await,
        "send-event" => send_event(session, args).await,
        _ => return None,
    };

    if let Err(e) = &result {
        tracing::debug!(command = name, "Console command failed: {}", e);
    }
    Some(result)
}

fn repl_mode<E: DebugEngine>(session: &mut Session<E>, args: &str) -> Result<String> {
    let words: Vec<&str> = args.split_ascii_whitespace().collect();
    match words.as_slice() {
        [] => Ok(format!("repl-mode {}.\n", session.repl_mode())),
        [mode] => {
            let mode: ReplMode = mode.parse()?;
            session.set_repl_mode(mode);
            Ok(format!("repl-mode {mode} set.\n"))
        }
        _ => Err(Error::ConsoleCommand(
            "Too many arguments. Usage: repl-mode [variable|command|auto]".to_string(),
        )),
    }
}

async fn start_debugging<E: DebugEngine>(session: &mut Session<E>, args: &str) -> Result<String> {
    let (request, configuration) = split_word(args);
    if request.is_empty() || configuration.is_empty() {
        return Err(Error::ConsoleCommand(
            "Usage: start-debugging <launch|attach> <configuration>".to_string(),
        ));
    }
    if request != "launch" && request != "attach" {
        return Err(Error::ConsoleCommand(format!(
            "Invalid request type '{request}', expected 'launch' or 'attach'"
        )));
    }

    let configuration: Value = serde_json::from_str(configuration)
        .map_err(|e| Error::ConsoleCommand(format!("Invalid configuration: {e}")))?;

    session
        .reverse_requests()
        .send(
            "startDebugging",
            json!({ "request": request, "configuration": configuration }),
            |outcome| {
                if let Err(e) = outcome {
                    tracing::warn!("startDebugging request failed: {}", e);
                }
            },
        )
        .await?;

    Ok(String::new())
}

async fn send_event<E: DebugEngine>(session: &mut Session<E>, args: &str) -> Result<String> {
    let (name, body) = split_word(args);
    if name.is_empty() {
        return Err(Error::ConsoleCommand(
            "Usage: send-event <name> [body]".to_string(),
        ));
    }
    if INTERNAL_EVENTS.contains(&name) {
        return Err(Error::ConsoleCommand(format!(
            "Invalid use of send-event, event \"{name}\" should be handled by the adapter internally."
        )));
    }

    let body = if body.is_empty() {
        None
    } else {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| Error::ConsoleCommand(format!("Invalid event body: {e}")))?;
        Some(value)
    };

    session.send_event(name, body).await?;
    Ok(String::new())
}

/// Split off the first whitespace-delimited word
fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.find(|c: char| c.is_ascii_whitespace()) {
        Some(end) => (&input[..end], input[end..].trim_start()),
        None => (input, ""),
    }
}
