use std::path::Path;
use std::time::Duration;

use miette::{ensure, miette};
use zb_dap_client::Session;

use super::{
    STOP_TIMEOUT, TXE_STEP_TIMEOUT, TXE_STOP_TIMEOUT, expect_stop, handshake, launch_and_configure, next_stop,
    set_breakpoints, stack_frames, thread_request, top_line,
};
use crate::scenario::ScenarioContext;

/// Sets breakpoints on `lines` and runs to the first of them.
fn run_to_breakpoint(session: &mut Session, source: &str, lines: &[i64]) -> miette::Result<i64> {
    handshake(session)?;
    set_breakpoints(session, source, lines)?;
    launch_and_configure(session)?;
    expect_stop(session, Some("breakpoint"), STOP_TIMEOUT)?;
    top_line(session)
}

/// Like [`run_to_breakpoint`] for targets that stop on entry first.
fn run_past_entry(session: &mut Session, source: &str, lines: &[i64], timeout: Duration) -> miette::Result<i64> {
    handshake(session)?;
    set_breakpoints(session, source, lines)?;
    launch_and_configure(session)?;
    expect_stop(session, None, STOP_TIMEOUT)?;
    thread_request(session, "continue")?;
    expect_stop(session, Some("breakpoint"), timeout)?;
    top_line(session)
}

pub fn step_over_detailed(session: &mut Session, ctx: &ScenarioContext) -> miette::Result<()> {
    let mut line = run_to_breakpoint(session, &ctx.source_path(), &[6])?;
    session.note(format!("Start at line {}", line));

    for step in 1..=4 {
        thread_request(session, "next")?;
        if next_stop(session, STOP_TIMEOUT).is_none() {
            session.note(format!("Program finished after {} steps", step - 1));
            break;
        }
        let next_line = top_line(session)?;
        ensure!(
            next_line > line,
            "Step {} went from line {} back to line {}",
            step,
            line,
            next_line
        );
        session.note(format!("Step {}: line {} -> {}", step, line, next_line));
        line = next_line;
    }
    Ok(())
}

pub fn stepping(session: &mut Session, ctx: &ScenarioContext) -> miette::Result<()> {
    run_to_breakpoint(session, &ctx.source_path(), &[6])?;

    thread_request(session, "next")?;
    expect_stop(session, Some("step"), STOP_TIMEOUT)?;
    let line = top_line(session)?;
    session.note(format!("next -> line {}", line));

    thread_request(session, "stepIn")?;
    expect_stop(session, None, STOP_TIMEOUT)?;
    let line = top_line(session)?;
    session.note(format!("stepIn -> line {}", line));
    Ok(())
}

pub fn step_in(session: &mut Session, ctx: &ScenarioContext) -> miette::Result<()> {
    run_to_breakpoint(session, &ctx.source_path(), &[6])?;
    thread_request(session, "stepIn")?;
    expect_stop(session, Some("step"), STOP_TIMEOUT)?;
    Ok(())
}

/// `next` over a nested contract call, then `stepOut` of one, each in a fresh adapter.
pub fn stepping_txe(session: &mut Session, ctx: &ScenarioContext) -> miette::Result<()> {
    let source = ctx.source_path();

    let line = run_past_entry(session, &source, &[174], TXE_STEP_TIMEOUT)?;
    ensure!(line == 174, "Expected to stop at line 174, got {}", line);
    thread_request(session, "next")?;
    expect_stop(session, Some("step"), TXE_STEP_TIMEOUT)?;

    let frames = stack_frames(session)?;
    let top = &frames[0];
    let line = top["line"]
        .as_i64()
        .ok_or_else(|| miette!("Top frame has no line: {}", top))?;
    let file = top["source"]["path"]
        .as_str()
        .and_then(|path| Path::new(path).file_name())
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    ensure!(
        file == "main.nr" && line >= 175,
        "next from line 174 should stay in main.nr at line 175 or later, got {}:{}",
        file,
        line
    );

    let mut nested = ctx.spawn_session()?;
    run_past_entry(&mut nested, &source, &[76], TXE_STOP_TIMEOUT)?;
    thread_request(&mut nested, "stepOut")?;
    expect_stop(&mut nested, Some("step"), TXE_STEP_TIMEOUT)?;
    let report = nested.shutdown();
    ensure!(
        !report.is_unexpected_failure(),
        "Second adapter failed: {}",
        report
    );
    Ok(())
}
