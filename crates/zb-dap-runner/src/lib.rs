//! Debug Adapter Protocol conformance scenarios for the `zb` debugger.
//!
//! Every scenario spawns its own `zb ... --debug-dap` process, drives it through a
//! [`zb_dap_client::Session`] and reports pass or fail. The [`Orchestrator`] runs the
//! catalog on a bounded rayon pool, guards each scenario with a watchdog and keeps
//! the adapter's stderr and the scenario's own logs for the failure report.
//!
//! ```no_run
//! use zb_dap_runner::{Orchestrator, Report, RunnerConfig, scenarios};
//!
//! let started = std::time::Instant::now();
//! let results = Orchestrator::new(RunnerConfig::from_env()).run(scenarios::catalog())?;
//! print!("{}", Report::new(results, started.elapsed()).render());
//! # Ok::<(), miette::Report>(())
//! ```
pub mod cli;
pub mod config;
pub mod logging;
pub mod orchestrator;
pub mod report;
pub mod scenario;
pub mod scenarios;

pub use cli::Cli;
pub use config::RunnerConfig;
pub use orchestrator::{Orchestrator, Outcome, ScenarioResult};
pub use report::Report;
pub use scenario::{Scenario, ScenarioContext, Target};
