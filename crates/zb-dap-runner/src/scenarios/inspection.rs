use miette::{ensure, miette};
use serde_json::Value;
use zb_dap_client::Session;

use super::{
    STOP_TIMEOUT, TXE_STOP_TIMEOUT, expect_stop, handshake, launch_and_configure, reference_of, scopes,
    set_breakpoints, stack_frames, thread_request, variables,
};
use crate::scenario::ScenarioContext;

/// Frame names carry the index of the VM executing them, e.g. `0:main`.
const VM_PREFIXES: [&str; 3] = ["0:", "1:", "2:"];

fn name_of(item: &Value) -> &str {
    item["name"].as_str().unwrap_or_default()
}

fn type_of(item: &Value) -> &str {
    item["type"].as_str().unwrap_or("unknown")
}

fn scopes_of_top_frame(session: &mut Session) -> miette::Result<Vec<Value>> {
    let frames = stack_frames(session)?;
    let found = scopes(session, &frames[0]["id"])?;
    let names: Vec<&str> = found.iter().map(name_of).collect();
    session.note(format!("Scopes: {:?}", names));
    Ok(found)
}

pub fn call_stack(session: &mut Session, ctx: &ScenarioContext) -> miette::Result<()> {
    handshake(session)?;
    set_breakpoints(session, &ctx.source_path(), &[12])?;
    launch_and_configure(session)?;
    expect_stop(session, Some("breakpoint"), STOP_TIMEOUT)?;

    let frames = stack_frames(session)?;
    for frame in &frames {
        session.note(format!("  {} (line {})", name_of(frame), frame["line"]));
    }
    ensure!(frames.len() >= 2, "Expected a nested call stack, got {} frame(s)", frames.len());
    ensure!(
        frames[0]["line"].as_i64() == Some(12),
        "Top frame should be at line 12, got {}",
        frames[0]["line"]
    );
    let top = name_of(&frames[0]);
    ensure!(
        VM_PREFIXES.iter().any(|prefix| top.starts_with(prefix)),
        "Top frame name `{}` has no VM index prefix",
        top
    );
    Ok(())
}

pub fn memory_tracking(session: &mut Session, ctx: &ScenarioContext) -> miette::Result<()> {
    handshake(session)?;
    set_breakpoints(session, &ctx.source_path(), &[15])?;
    launch_and_configure(session)?;
    expect_stop(session, None, STOP_TIMEOUT)?;

    let found = scopes_of_top_frame(session)?;
    match found.iter().find(|scope| name_of(scope).contains("Memory Writes")) {
        Some(scope) => {
            let writes = variables(session, &scope["variablesReference"])?;
            session.note(format!("Memory writes contains {} slots", writes.len()));
            for write in writes.iter().take(5) {
                session.note(format!("  {}: {}", name_of(write), write["value"]));
            }
        }
        None => session.note("No Memory Writes scope (no writes yet)"),
    }
    Ok(())
}

pub fn variables_txe(session: &mut Session, ctx: &ScenarioContext) -> miette::Result<()> {
    handshake(session)?;
    set_breakpoints(session, &ctx.source_path(), &[10])?;
    launch_and_configure(session)?;

    if session.wait_for_event("stopped", STOP_TIMEOUT).is_none() {
        thread_request(session, "pause")?;
        expect_stop(session, None, STOP_TIMEOUT)?;
    }

    let found = scopes_of_top_frame(session)?;
    ensure!(
        found.iter().any(|scope| name_of(scope) == "TXE Global State"),
        "Missing TXE Global State scope"
    );
    ensure!(
        found.iter().any(|scope| name_of(scope).contains("VM State")),
        "Expected at least one VM State scope"
    );

    for scope in &found {
        let scope_name = name_of(scope);
        for var in variables(session, &scope["variablesReference"])? {
            check_variable_type(scope_name, &var)?;
            if scope_name == "Current Call State" && name_of(&var) == "memory_writes" && reference_of(&var) > 0 {
                let writes = variables(session, &var["variablesReference"])?;
                session.note(format!("memory_writes expands to {} entries", writes.len()));
            }
        }
    }
    Ok(())
}

fn check_variable_type(scope: &str, var: &Value) -> miette::Result<()> {
    let expected = match (scope, name_of(var)) {
        ("TXE Global State", "block_number") => "u32",
        ("TXE Global State", "timestamp") => "u64",
        ("TXE Global State", "chain_id") => "Field",
        ("Current Call State", "contract_address") => "AztecAddress",
        ("Current Call State", "is_static_call") => "bool",
        ("Current Call State", "num_storage_writes" | "num_private_logs") => "usize",
        _ => return Ok(()),
    };
    ensure!(
        type_of(var) == expected,
        "{} in {} should be {}, got {}",
        name_of(var),
        scope,
        expected,
        type_of(var)
    );
    if expected == "bool" {
        ensure!(
            matches!(var["value"].as_str(), Some("true" | "false")),
            "{} should be true or false, got {}",
            name_of(var),
            var["value"]
        );
    }
    Ok(())
}

pub fn note_expansion(session: &mut Session, ctx: &ScenarioContext) -> miette::Result<()> {
    handshake(session)?;
    set_breakpoints(session, &ctx.source_path(), &[77])?;
    launch_and_configure(session)?;
    expect_stop(session, None, TXE_STOP_TIMEOUT)?;
    thread_request(session, "continue")?;
    expect_stop(session, Some("breakpoint"), TXE_STOP_TIMEOUT)?;

    let found = scopes_of_top_frame(session)?;
    let mut expanded = false;
    for scope in found.iter().filter(|scope| name_of(scope).contains("VM State")) {
        let vars = variables(session, &scope["variablesReference"])?;
        let Some(notes) = vars.iter().find(|var| name_of(var) == "notes") else {
            continue;
        };
        ensure!(reference_of(notes) > 0, "notes in {} is not expandable", name_of(scope));

        let items = variables(session, &notes["variablesReference"])?;
        session.note(format!("{} holds {} notes", name_of(scope), items.len()));
        for item in items.iter().take(3) {
            session.note(format!("  {} = {}", name_of(item), item["value"]));
        }
        expanded = true;
    }
    if expanded {
        Ok(())
    } else {
        Err(miette!("No VM State scope exposes a `notes` variable"))
    }
}
