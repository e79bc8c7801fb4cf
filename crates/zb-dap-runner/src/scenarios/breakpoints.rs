use std::time::Duration;

use miette::ensure;
use serde_json::Value;
use zb_dap_client::{Message, Session};

use super::{STOP_TIMEOUT, expect_stop, handshake, launch_and_configure, set_breakpoints, thread_request, top_line};
use crate::scenario::ScenarioContext;

/// Comment lines of `simple_test/src/main.nr`, each directly above a code line.
const COMMENT_LINES: [i64; 4] = [5, 8, 11, 14];

pub fn line_adjustment(session: &mut Session, ctx: &ScenarioContext) -> miette::Result<()> {
    handshake(session)?;
    let reported = set_breakpoints(session, &ctx.source_path(), &COMMENT_LINES)?;
    ensure!(
        reported.len() == COMMENT_LINES.len(),
        "Expected {} breakpoints, got {}",
        COMMENT_LINES.len(),
        reported.len()
    );

    launch_and_configure(session)?;
    expect_stop(session, Some("breakpoint"), STOP_TIMEOUT)?;

    let changes: Vec<Value> = session
        .drain(Duration::from_millis(500))
        .into_iter()
        .filter(|message| message.is_event("breakpoint"))
        .filter_map(Message::into_event)
        .filter_map(|event| event.body)
        .map(|body| body["breakpoint"].clone())
        .collect();
    ensure!(!changes.is_empty(), "No breakpoint events announced the moved breakpoints");
    for breakpoint in &changes {
        if let Some(message) = breakpoint["message"].as_str() {
            session.note(message);
        }
    }
    let moved_to: Vec<i64> = changes.iter().filter_map(|bp| bp["line"].as_i64()).collect();
    ensure!(
        moved_to.iter().all(|line| !COMMENT_LINES.contains(line)),
        "A breakpoint stayed on a comment line: {:?}",
        moved_to
    );
    let line = top_line(session)?;
    session.note(format!("First stop at line {}", line));

    let mut hits = Vec::new();
    for _ in 0..3 {
        thread_request(session, "continue")?;
        let Some(stop) = session.wait_for_event("stopped", STOP_TIMEOUT) else {
            break;
        };
        if stop.reason() == Some("breakpoint") {
            hits.push(top_line(session)?);
        }
    }
    ensure!(hits == [9, 12, 15], "Expected breakpoint hits at [9, 12, 15], got {:?}", hits);
    Ok(())
}

pub fn multiple_files(session: &mut Session, ctx: &ScenarioContext) -> miette::Result<()> {
    handshake(session)?;
    let main = ctx.source_path();
    let helpers = ctx.sibling_source("helpers.nr");

    let in_main = set_breakpoints(session, &main, &[6])?;
    let in_helpers = set_breakpoints(session, &helpers, &[6])?;
    let main_id = single_id(&in_main)?;
    let helpers_id = single_id(&in_helpers)?;
    ensure!(
        main_id != helpers_id,
        "Line 6 of two files shares breakpoint id {}",
        main_id
    );

    let again = set_breakpoints(session, &main, &[6])?;
    ensure!(
        single_id(&again)? == main_id,
        "Re-setting a breakpoint changed its id"
    );
    Ok(())
}

pub fn stable_ids(session: &mut Session, ctx: &ScenarioContext) -> miette::Result<()> {
    handshake(session)?;
    let source = ctx.source_path();

    let first = set_breakpoints(session, &source, &[5, 8])?;
    ensure!(first.len() == 2, "Expected 2 breakpoints, got {}", first.len());
    for breakpoint in &first {
        ensure!(breakpoint["id"].is_i64(), "Breakpoint without id: {}", breakpoint);
        ensure!(breakpoint["line"].is_i64(), "Breakpoint without line: {}", breakpoint);
    }

    let second = set_breakpoints(session, &source, &[5, 8])?;
    let ids = |breakpoints: &[Value]| breakpoints.iter().map(|bp| bp["id"].clone()).collect::<Vec<_>>();
    ensure!(
        ids(&first) == ids(&second),
        "Breakpoint ids changed: {:?} -> {:?}",
        ids(&first),
        ids(&second)
    );
    Ok(())
}

fn single_id(breakpoints: &[Value]) -> miette::Result<i64> {
    ensure!(breakpoints.len() == 1, "Expected 1 breakpoint, got {}", breakpoints.len());
    breakpoints[0]["id"]
        .as_i64()
        .ok_or_else(|| miette::miette!("Breakpoint without id: {}", breakpoints[0]))
}
