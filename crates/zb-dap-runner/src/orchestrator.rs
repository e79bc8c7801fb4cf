use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, select};
use miette::IntoDiagnostic;
use rayon::prelude::*;
use tracing::{info, info_span, warn};
use zb_dap_client::diagnostics;
use zb_dap_client::{DiagnosticLog, ExitReport, KillSwitch};

use crate::config::RunnerConfig;
use crate::logging;
use crate::scenario::{Scenario, ScenarioContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
    Panicked(String),
    TimedOut,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Passed)
    }
}

/// Everything known about one scenario once it has finished.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub name: &'static str,
    pub outcome: Outcome,
    pub duration: Duration,
    /// Adapter stderr, scenario notes and tracing output, in arrival order.
    pub output: String,
    /// `None` if the adapter could not be spawned.
    pub exit: Option<ExitReport>,
}

/// Runs scenarios, each against its own adapter process, on a bounded pool.
pub struct Orchestrator {
    config: RunnerConfig,
}

impl Orchestrator {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs `scenarios` in parallel; results come back in the same order.
    pub fn run(&self, scenarios: &[Scenario]) -> miette::Result<Vec<ScenarioResult>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.jobs)
            .thread_name(|index| format!("zb-dap-scenario-{}", index))
            .build()
            .into_diagnostic()?;

        info!(scenarios = scenarios.len(), jobs = self.config.jobs, "Running scenarios");
        Ok(pool.install(|| scenarios.par_iter().map(|scenario| self.run_one(scenario)).collect()))
    }

    /// Runs one scenario to completion. Never panics, whatever the scenario does.
    pub fn run_one(&self, scenario: &Scenario) -> ScenarioResult {
        let started = Instant::now();
        let (log, log_rx) = DiagnosticLog::new();
        let (switch_tx, switch_rx) = crossbeam_channel::unbounded();
        let (disarm_tx, disarm_rx) = crossbeam_channel::bounded::<()>(1);
        let fired = Arc::new(AtomicBool::new(false));

        let watchdog = spawn_watchdog(
            scenario.name,
            self.config.scenario_timeout,
            switch_rx,
            disarm_rx,
            Arc::clone(&fired),
            log.clone(),
        );

        let subscriber = logging::scenario_subscriber(&self.config.log_level, log.clone());
        let (outcome, exit) = tracing::subscriber::with_default(subscriber, || {
            let _span = info_span!("scenario", scenario = scenario.name).entered();
            if let Err(err) = &watchdog {
                return (Outcome::Failed(format!("Could not start watchdog: {}", err)), None);
            }

            let launch = self
                .config
                .launch_for(scenario.name, scenario.target, scenario.extra_args);
            let ctx = ScenarioContext::new(
                scenario.target,
                self.config.source_for(scenario.target),
                launch,
                log.clone(),
                self.config.request_timeout,
                switch_tx,
            );
            let mut session = match ctx.spawn_session() {
                Ok(session) => session,
                Err(err) => return (Outcome::Failed(err.to_string()), None),
            };

            let result = panic::catch_unwind(AssertUnwindSafe(|| (scenario.run)(&mut session, &ctx)));
            // The watchdog stays armed until the adapter is down.
            let exit = session.shutdown();
            (classify(result, &exit), Some(exit))
        });
        drop(disarm_tx);

        if let Ok(handle) = watchdog {
            if handle.join().is_err() {
                warn!(scenario = scenario.name, "Watchdog thread panicked");
                log.line("watchdog: thread panicked, scenario ran unguarded");
            }
        }
        let outcome = if fired.load(Ordering::Acquire) {
            Outcome::TimedOut
        } else {
            outcome
        };

        ScenarioResult {
            name: scenario.name,
            outcome,
            duration: started.elapsed(),
            output: diagnostics::collect(&log_rx),
            exit,
        }
    }
}

fn classify(result: thread::Result<miette::Result<()>>, exit: &ExitReport) -> Outcome {
    match result {
        Ok(Ok(())) if exit.is_unexpected_failure() => Outcome::Failed(format!("Adapter {}", exit)),
        Ok(Ok(())) => Outcome::Passed,
        Ok(Err(report)) if exit.is_unexpected_failure() => {
            Outcome::Failed(format!("{} (adapter {})", report, exit))
        }
        Ok(Err(report)) => Outcome::Failed(report.to_string()),
        Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Kills every registered adapter once `timeout` passes, unless disarmed first.
fn spawn_watchdog(
    name: &'static str,
    timeout: Duration,
    switches: Receiver<KillSwitch>,
    disarm: Receiver<()>,
    fired: Arc<AtomicBool>,
    log: DiagnosticLog,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("{}-watchdog", name))
        .spawn(move || {
            // Too far out to represent means the deadline never comes.
            let expired = match Instant::now().checked_add(timeout) {
                Some(deadline) => crossbeam_channel::at(deadline),
                None => crossbeam_channel::never(),
            };
            let mut switches = switches;
            let mut armed: Vec<KillSwitch> = Vec::new();
            loop {
                select! {
                    recv(switches) -> switch => match switch {
                        Ok(switch) => armed.push(switch),
                        Err(_) => switches = crossbeam_channel::never(),
                    },
                    recv(disarm) -> _ => return,
                    recv(expired) -> _ => {
                        fired.store(true, Ordering::Release);
                        warn!(scenario = name, ?timeout, "Scenario timed out, killing adapter");
                        log.line(format!("watchdog: scenario exceeded {:?}, adapter killed", timeout));
                        for switch in &armed {
                            switch.trigger();
                        }
                        return;
                    }
                }
            }
        })
}
