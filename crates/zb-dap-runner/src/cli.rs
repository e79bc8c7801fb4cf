use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use colored::Colorize;
use miette::miette;

use crate::config::RunnerConfig;
use crate::logging;
use crate::orchestrator::Orchestrator;
use crate::report::Report;
use crate::scenario::Scenario;
use crate::scenarios;

#[derive(Parser, Debug, Default)]
#[command(name = "zb-dap-test")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## Run every scenario against ./zig-out/bin/zb:\n\
    zb-dap-test\n\n\
    ## Run two scenarios one at a time:\n\
    zb-dap-test -j 1 call_stack stepping_txe\n\n\
    ## Use another build of the debugger:\n\
    zb-dap-test --adapter ./zig-out/bin/zb --workdir ~/src/ziegenberg")]
#[command(
    about = "Runs the Debug Adapter Protocol scenarios against the zb debugger.",
    long_about = None
)]
pub struct Cli {
    /// List the scenario catalog and exit
    #[arg(long)]
    list: bool,

    /// Number of scenarios run at the same time
    #[arg(short = 'j', long)]
    jobs: Option<usize>,

    /// Debug adapter binary
    #[arg(long)]
    adapter: Option<PathBuf>,

    /// Directory the adapter runs in; relative paths are resolved against it
    #[arg(long)]
    workdir: Option<PathBuf>,

    /// Scenarios to run (default: all)
    #[arg(value_name = "SCENARIO")]
    scenarios: Vec<String>,
}

impl Cli {
    pub fn run(&self) -> miette::Result<ExitCode> {
        if self.list {
            for scenario in scenarios::catalog() {
                println!(
                    "{:<28} {}  {}",
                    scenario.name.bold(),
                    scenario.target.to_string().cyan(),
                    scenario.description
                );
            }
            return Ok(ExitCode::SUCCESS);
        }

        let selected = self.selected()?;
        let config = self.apply(RunnerConfig::from_env())?;
        logging::init_tracing(&config);

        let started = Instant::now();
        let results = Orchestrator::new(config).run(&selected)?;
        let report = Report::new(results, started.elapsed());
        print!("{}", report.render());
        Ok(report.exit_code())
    }

    /// Command-line flags win over the environment.
    pub fn apply(&self, mut config: RunnerConfig) -> miette::Result<RunnerConfig> {
        if let Some(jobs) = self.jobs {
            if jobs == 0 {
                return Err(miette!("--jobs must be at least 1"));
            }
            config.jobs = jobs;
        }
        if let Some(adapter) = &self.adapter {
            config.adapter = adapter.clone();
        }
        if let Some(workdir) = &self.workdir {
            config.workdir = workdir.clone();
        }
        Ok(config)
    }

    /// The scenarios named on the command line in catalog order, or the whole catalog.
    pub fn selected(&self) -> miette::Result<Vec<Scenario>> {
        if self.scenarios.is_empty() {
            return Ok(scenarios::catalog().to_vec());
        }
        if let Some(unknown) = self
            .scenarios
            .iter()
            .find(|name| scenarios::find(name).is_none())
        {
            return Err(miette!(
                "Unknown scenario `{}`. Run with --list to see the catalog.",
                unknown
            ));
        }
        Ok(scenarios::catalog()
            .iter()
            .filter(|scenario| self.scenarios.iter().any(|name| name == scenario.name))
            .copied()
            .collect())
    }
}
