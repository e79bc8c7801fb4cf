use std::path::PathBuf;
use std::time::{Duration, Instant};

use assert_cmd::cargo;
use rstest::rstest;
use serde_json::json;
use zb_dap_client::{DiagnosticLog, Session};
use zb_dap_runner::scenario::Target;
use zb_dap_runner::{Orchestrator, Outcome, Report, RunnerConfig, Scenario, scenarios};

fn mock_config() -> RunnerConfig {
    RunnerConfig {
        adapter: PathBuf::from(env!("CARGO_BIN_EXE_zb-dap-mock")),
        workdir: std::env::temp_dir(),
        scenario_timeout: Duration::from_secs(30),
        jobs: 4,
        log_level: "off".to_string(),
        ..RunnerConfig::default()
    }
}

fn spawn(target: Target) -> Session {
    let config = mock_config();
    let (log, _rx) = DiagnosticLog::new();
    Session::spawn(&config.launch_for("e2e", target, &[]), log).unwrap()
}

fn outcome_of<'a>(report: &'a Report, name: &str) -> &'a Outcome {
    &report
        .results()
        .iter()
        .find(|result| result.name == name)
        .unwrap()
        .outcome
}

#[test]
fn test_full_catalog_passes_against_the_mock() {
    let started = Instant::now();
    let results = Orchestrator::new(mock_config()).run(scenarios::catalog()).unwrap();
    let report = Report::new(results, started.elapsed());

    assert_eq!(report.results().len(), scenarios::catalog().len());
    assert!(report.is_success(), "{}", report.render());
}

#[test]
fn test_crashing_adapter_fails_only_its_scenario() {
    let mut selected: Vec<Scenario> = ["initialization", "call_stack", "step_in"]
        .iter()
        .filter_map(|name| scenarios::find(name).copied())
        .collect();
    selected[1] = selected[1].with_args(&["--fault", "crash"]);

    let started = Instant::now();
    let results = Orchestrator::new(mock_config()).run(&selected).unwrap();
    let report = Report::new(results, started.elapsed());

    assert_eq!(report.results().len(), 3);
    assert_eq!(outcome_of(&report, "initialization"), &Outcome::Passed);
    assert_eq!(outcome_of(&report, "step_in"), &Outcome::Passed);
    assert!(matches!(outcome_of(&report, "call_stack"), Outcome::Failed(_)));

    let crashed = &report.results()[1];
    assert!(crashed.output.contains("simulated crash"), "{}", crashed.output);
    let exit = crashed.exit.unwrap();
    assert!(exit.exited_on_its_own);
    assert_eq!(exit.status.and_then(|status| status.code()), Some(101));
}

#[test]
fn test_silent_adapter_times_out_requests() {
    let scenario = scenarios::find("stable_breakpoint_ids")
        .copied()
        .unwrap()
        .with_args(&["--fault", "silent"]);
    let config = RunnerConfig {
        request_timeout: Duration::from_millis(300),
        ..mock_config()
    };

    let result = Orchestrator::new(config).run_one(&scenario);
    match &result.outcome {
        Outcome::Failed(reason) => assert!(reason.contains("Timed out waiting for the `initialize` response")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(!result.exit.unwrap().is_unexpected_failure());
}

#[test]
fn test_watchdog_stops_a_scenario_stuck_on_a_silent_adapter() {
    let scenario = scenarios::find("pause_command")
        .copied()
        .unwrap()
        .with_args(&["--fault", "silent"]);
    let config = RunnerConfig {
        request_timeout: Duration::from_secs(20),
        scenario_timeout: Duration::from_millis(500),
        ..mock_config()
    };

    let started = Instant::now();
    let result = Orchestrator::new(config).run_one(&scenario);
    assert_eq!(result.outcome, Outcome::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_initialize_then_initialized() {
    let mut session = spawn(Target::Cvm);

    let response = session
        .request("initialize", Some(json!({"clientID": "test", "adapterID": "zb"})))
        .unwrap();
    assert!(response.success);
    assert!(session.wait_for_event("initialized", Duration::from_secs(2)).is_some());
    assert!(!session.shutdown().is_unexpected_failure());
}

#[test]
fn test_set_breakpoints_returns_ids_and_lines() {
    let mut session = spawn(Target::Cvm);
    session.request_ok("initialize", Some(json!({"clientID": "test", "adapterID": "zb"}))).unwrap();

    let source = mock_config().source_for(Target::Cvm);
    let response = session
        .request_ok(
            "setBreakpoints",
            Some(json!({"source": {"path": source}, "breakpoints": [{"line": 5}, {"line": 8}]})),
        )
        .unwrap();

    let breakpoints = response.body_field("breakpoints").and_then(|b| b.as_array()).unwrap();
    assert_eq!(breakpoints.len(), 2);
    assert!(breakpoints.iter().all(|bp| bp["id"].is_i64() && bp["line"].is_i64()));
}

#[test]
fn test_terminate_while_running() {
    let mut session = spawn(Target::Txe);
    session.request_ok("initialize", Some(json!({"clientID": "test", "adapterID": "zb"}))).unwrap();
    session.request_ok("launch", Some(json!({}))).unwrap();
    session.request_ok("configurationDone", None).unwrap();
    assert!(session.wait_for_event("stopped", Duration::from_secs(2)).is_some());
    session.request_ok("continue", Some(json!({"threadId": 1}))).unwrap();

    let response = session.request("terminate", Some(json!({}))).unwrap();
    assert!(response.success);
    assert!(session.wait_for_event("terminated", Duration::from_secs(2)).is_some());

    session.request_ok("disconnect", Some(json!({}))).unwrap();
    let report = session.shutdown();
    assert!(!report.is_unexpected_failure());
}

#[rstest]
#[case::cvm(vec!["cvm", "run", "--artifact_path", "./simple_test/target/simple_test.json"], "simple_test: ok")]
#[case::txe(vec!["txe", "./Counter__pass.json"], "Counter__pass: ok")]
fn test_without_debug_dap_just_runs(#[case] args: Vec<&str>, #[case] expected: &str) {
    let mut cmd = cargo::cargo_bin_cmd!("zb-dap-mock");
    let assert = cmd.args(args).assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.starts_with(expected), "stdout: {}", stdout);
}

#[test]
fn test_crash_fault_exit_code() {
    let mut cmd = cargo::cargo_bin_cmd!("zb-dap-mock");
    let assert = cmd
        .args(["--fault", "crash", "txe", "t.json", "--debug-dap"])
        .assert()
        .code(101);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("simulated crash"), "stderr: {}", stderr);
}
