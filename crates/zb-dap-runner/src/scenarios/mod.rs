//! The scenario catalog and the protocol steps its scripts share.
mod breakpoints;
mod inspection;
mod lifecycle;
mod stepping;

use std::time::{Duration, Instant};

use miette::{IntoDiagnostic, miette};
use serde_json::{Value, json};
use zb_dap_client::{Event, Response, Session};

use crate::scenario::{Scenario, Target};

/// How long a scenario waits for the adapter to stop after resuming it.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// TXE runs contract calls in nested VMs, so reaching a breakpoint can take much longer.
pub const TXE_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Stepping over or out of a nested call on TXE.
pub const TXE_STEP_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_SLICE: Duration = Duration::from_millis(50);

const CATALOG: &[Scenario] = &[
    Scenario::new(
        "breakpoint_line_adjustment",
        Target::Cvm,
        "breakpoints on comment lines move to the next code line",
        breakpoints::line_adjustment,
    ),
    Scenario::new(
        "call_stack",
        Target::Cvm,
        "stack trace inside a nested function",
        inspection::call_stack,
    ),
    Scenario::new(
        "initialization",
        Target::Cvm,
        "handshake without launch does not stop",
        lifecycle::initialization,
    ),
    Scenario::new(
        "memory_tracking",
        Target::Cvm,
        "memory writes are listed as variables",
        inspection::memory_tracking,
    ),
    Scenario::new(
        "multiple_files",
        Target::Cvm,
        "breakpoint ids are unique per file and line",
        breakpoints::multiple_files,
    ),
    Scenario::new(
        "pause_command",
        Target::Txe,
        "pause stops a running program",
        lifecycle::pause_command,
    ),
    Scenario::new(
        "step_over_detailed",
        Target::Cvm,
        "next always moves forward",
        stepping::step_over_detailed,
    ),
    Scenario::new(
        "stepping_txe",
        Target::Txe,
        "next and stepOut across nested VMs",
        stepping::stepping_txe,
    ),
    Scenario::new(
        "stepping",
        Target::Cvm,
        "next then stepIn from a breakpoint",
        stepping::stepping,
    ),
    Scenario::new(
        "terminate_command",
        Target::Txe,
        "terminate ends the session",
        lifecycle::terminate_command,
    ),
    Scenario::new(
        "variables_txe",
        Target::Txe,
        "TXE scopes expose typed variables",
        inspection::variables_txe,
    ),
    Scenario::new("step_in", Target::Cvm, "stepIn reports a step stop", stepping::step_in),
    Scenario::new(
        "stable_breakpoint_ids",
        Target::Cvm,
        "breakpoint ids survive re-sending the same set",
        breakpoints::stable_ids,
    ),
    Scenario::new(
        "note_expansion",
        Target::Txe,
        "notes of a nested VM can be expanded",
        inspection::note_expansion,
    ),
];

/// Every scenario, in the order they are reported.
pub fn catalog() -> &'static [Scenario] {
    CATALOG
}

pub fn find(name: &str) -> Option<&'static Scenario> {
    CATALOG.iter().find(|scenario| scenario.name == name)
}

/// `initialize`, then the `initialized` event.
pub fn handshake(session: &mut Session) -> miette::Result<Response> {
    let response = session
        .request_ok(
            "initialize",
            Some(json!({
                "clientID": "zb-dap-runner",
                "adapterID": "zb",
                "linesStartAt1": true,
                "supportsVariableType": true,
            })),
        )
        .into_diagnostic()?;
    let timeout = session.default_timeout();
    session
        .wait_for_event("initialized", timeout)
        .ok_or_else(|| miette!("No initialized event after initialize"))?;
    Ok(response)
}

/// Replaces the breakpoints of `source`, returning the adapter's view of them.
pub fn set_breakpoints(session: &mut Session, source: &str, lines: &[i64]) -> miette::Result<Vec<Value>> {
    let breakpoints: Vec<Value> = lines.iter().map(|line| json!({ "line": line })).collect();
    let response = session
        .request_ok(
            "setBreakpoints",
            Some(json!({ "source": { "path": source }, "breakpoints": breakpoints })),
        )
        .into_diagnostic()?;
    let reported = body_array(&response, "breakpoints")?;
    session.note(format!("setBreakpoints {:?} -> {} breakpoints", lines, reported.len()));
    Ok(reported)
}

pub fn launch_and_configure(session: &mut Session) -> miette::Result<()> {
    session.request_ok("launch", Some(json!({}))).into_diagnostic()?;
    session.request_ok("configurationDone", None).into_diagnostic()?;
    Ok(())
}

/// Waits for a `stopped` event, optionally checking its reason.
pub fn expect_stop(session: &mut Session, reason: Option<&str>, timeout: Duration) -> miette::Result<Event> {
    let event = session
        .wait_for_event("stopped", timeout)
        .ok_or_else(|| miette!("No stopped event within {:?}", timeout))?;
    if let Some(expected) = reason {
        miette::ensure!(
            event.reason() == Some(expected),
            "Expected stop reason `{}`, got {:?}",
            expected,
            event.reason()
        );
    }
    Ok(event)
}

/// Next `stopped` event, or `None` as soon as the program terminates.
pub fn next_stop(session: &mut Session, timeout: Duration) -> Option<Event> {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        let slice = deadline.map_or(POLL_SLICE, |deadline| {
            deadline.saturating_duration_since(Instant::now()).min(POLL_SLICE)
        });
        if let Some(event) = session.wait_for_event("stopped", slice) {
            return Some(event);
        }
        if session.wait_for_event("terminated", Duration::ZERO).is_some()
            || session.is_closed()
            || deadline.is_some_and(|deadline| Instant::now() >= deadline)
        {
            return None;
        }
    }
}

/// Sends `command` for thread 1 and returns its response.
pub fn thread_request(session: &mut Session, command: &str) -> miette::Result<Response> {
    session
        .request_ok(command, Some(json!({ "threadId": 1 })))
        .into_diagnostic()
}

pub fn stack_frames(session: &mut Session) -> miette::Result<Vec<Value>> {
    let response = thread_request(session, "stackTrace")?;
    let frames = body_array(&response, "stackFrames")?;
    miette::ensure!(!frames.is_empty(), "stackTrace returned no frames");
    Ok(frames)
}

pub fn top_line(session: &mut Session) -> miette::Result<i64> {
    let frames = stack_frames(session)?;
    frames[0]["line"]
        .as_i64()
        .ok_or_else(|| miette!("Top frame has no line: {}", frames[0]))
}

pub fn scopes(session: &mut Session, frame_id: &Value) -> miette::Result<Vec<Value>> {
    let response = session
        .request_ok("scopes", Some(json!({ "frameId": frame_id })))
        .into_diagnostic()?;
    body_array(&response, "scopes")
}

pub fn variables(session: &mut Session, reference: &Value) -> miette::Result<Vec<Value>> {
    let response = session
        .request_ok("variables", Some(json!({ "variablesReference": reference })))
        .into_diagnostic()?;
    body_array(&response, "variables")
}

fn body_array(response: &Response, key: &str) -> miette::Result<Vec<Value>> {
    response
        .body_field(key)
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| miette!("`{}` response has no `{}` array", response.command, key))
}

/// `variablesReference` of an item, 0 if it has no children.
pub fn reference_of(item: &Value) -> i64 {
    item["variablesReference"].as_i64().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io::Cursor;

    use zb_dap_client::codec::encode;
    use zb_dap_client::{DiagnosticLog, Message};

    use super::*;

    fn session_with(messages: Vec<Message>) -> Session {
        let input: Vec<u8> = messages.iter().flat_map(|m| encode(m).unwrap()).collect();
        let (log, _rx) = DiagnosticLog::new();
        Session::from_streams("scripted", std::io::sink(), Cursor::new(input), None, log).unwrap()
    }

    fn event(seq: i64, name: &str, body: Value) -> Message {
        Event {
            seq,
            name: name.to_string(),
            body: Some(body),
        }
        .into()
    }

    #[test]
    fn test_catalog_names_are_unique() {
        let names: HashSet<&str> = catalog().iter().map(|s| s.name).collect();
        assert_eq!(names.len(), catalog().len());
        assert_eq!(catalog().len(), 14);
        assert_eq!(catalog()[0].name, "breakpoint_line_adjustment");
        assert_eq!(find("note_expansion").map(|s| s.target), Some(Target::Txe));
        assert!(find("evaluate").is_none());
    }

    #[test]
    fn test_expect_stop_checks_reason() {
        let mut session = session_with(vec![event(1, "stopped", json!({"reason": "entry", "threadId": 1}))]);
        let err = expect_stop(&mut session, Some("breakpoint"), Duration::from_millis(200)).unwrap_err();
        assert!(err.to_string().contains("breakpoint"));
    }

    #[test]
    fn test_next_stop_returns_early_on_terminated() {
        let mut session = session_with(vec![event(1, "terminated", json!({}))]);
        let started = Instant::now();
        assert!(next_stop(&mut session, Duration::from_secs(5)).is_none());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_next_stop_without_deadline_ends_with_the_stream() {
        let mut session = session_with(vec![event(1, "output", json!({"output": "x"}))]);
        let started = Instant::now();
        assert!(next_stop(&mut session, Duration::MAX).is_none());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_txe_waits_outlast_cvm_waits() {
        assert_eq!(TXE_STOP_TIMEOUT, Duration::from_secs(30));
        assert_eq!(TXE_STEP_TIMEOUT, Duration::from_secs(5));
        assert!(STOP_TIMEOUT < TXE_STEP_TIMEOUT);
    }

    #[test]
    fn test_next_stop_prefers_stopped() {
        let mut session = session_with(vec![
            event(1, "output", json!({"output": "x"})),
            event(2, "stopped", json!({"reason": "step"})),
        ]);
        let stop = next_stop(&mut session, Duration::from_secs(1)).unwrap();
        assert_eq!(stop.reason(), Some("step"));
    }

    #[test]
    fn test_reference_of() {
        assert_eq!(reference_of(&json!({"name": "notes", "variablesReference": 4})), 4);
        assert_eq!(reference_of(&json!({"name": "pc"})), 0);
    }
}
