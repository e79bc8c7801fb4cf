use std::thread;
use std::time::Duration;

use miette::{IntoDiagnostic, ensure, miette};
use zb_dap_client::Session;

use super::{STOP_TIMEOUT, expect_stop, handshake, launch_and_configure, thread_request};
use crate::scenario::ScenarioContext;

/// Time the program gets to run before it is interrupted.
const RUN_BRIEFLY: Duration = Duration::from_millis(500);

pub fn initialization(session: &mut Session, _ctx: &ScenarioContext) -> miette::Result<()> {
    handshake(session)?;
    session.request_ok("configurationDone", None).into_diagnostic()?;

    let stopped = session.wait_for_event("stopped", Duration::from_millis(500));
    ensure!(
        stopped.is_none(),
        "Adapter stopped without a launch request: {:?}",
        stopped
    );
    Ok(())
}

/// Launches and lets the program run past its entry stop.
fn launch_and_run(session: &mut Session) -> miette::Result<()> {
    handshake(session)?;
    launch_and_configure(session)?;
    if session.wait_for_event("stopped", Duration::from_secs(1)).is_some() {
        thread_request(session, "continue")?;
    }
    thread::sleep(RUN_BRIEFLY);
    Ok(())
}

pub fn pause_command(session: &mut Session, _ctx: &ScenarioContext) -> miette::Result<()> {
    launch_and_run(session)?;

    let seq = session
        .send_request("pause", Some(serde_json::json!({ "threadId": 1 })))
        .into_diagnostic()?;
    let response = session.wait_for_response(seq, Duration::from_secs(1));
    if session.wait_for_event("terminated", Duration::ZERO).is_some() {
        session.note("Program terminated before it could be paused");
        return Ok(());
    }

    let response = response.ok_or_else(|| miette!("No response to pause"))?;
    ensure!(
        response.success,
        "pause failed: {}",
        response.message.as_deref().unwrap_or("no message")
    );
    expect_stop(session, Some("pause"), STOP_TIMEOUT)?;
    thread_request(session, "continue")?;
    Ok(())
}

pub fn terminate_command(session: &mut Session, _ctx: &ScenarioContext) -> miette::Result<()> {
    launch_and_run(session)?;

    let seq = session
        .send_request("terminate", Some(serde_json::json!({})))
        .into_diagnostic()?;
    let response = session
        .wait_for_response(seq, Duration::from_secs(1))
        .ok_or_else(|| miette!("No response to terminate"))?;
    ensure!(response.success, "terminate failed: {:?}", response.message);

    session
        .wait_for_event("terminated", Duration::from_secs(2))
        .ok_or_else(|| miette!("No terminated event within 2s of terminate"))?;
    Ok(())
}
