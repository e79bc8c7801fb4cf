use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use crate::program::Program;
use crate::server;

const DEFAULT_LOG_FILTER: &str = "zb_dap_mock=info";

/// Exit status of a simulated adapter crash.
pub const CRASH_EXIT_CODE: u8 = 101;

#[derive(Parser, Debug)]
#[command(name = "zb-dap-mock")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## Debug a circuit over stdio:\n\
    zb-dap-mock cvm run --artifact_path ./simple_test/target/simple_test.json --calldata_path ./simple_test/Prover.toml --debug-dap\n\n\
    ## Debug a contract test:\n\
    zb-dap-mock txe ./Counter__extended_incrementing_and_decrementing_pass.json --debug-dap")]
#[command(
    about = "Scripted stand-in for `zb --debug-dap` that walks canned programs.",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    target: Target,

    /// Speak the Debug Adapter Protocol on stdin/stdout
    #[arg(long = "debug-dap", global = true)]
    debug_dap: bool,

    /// Misbehave on purpose
    #[arg(long, value_enum, global = true)]
    fault: Option<Fault>,
}

#[derive(Subcommand, Debug)]
enum Target {
    /// Execute a circuit on the CVM
    Cvm {
        #[command(subcommand)]
        command: CvmCommand,
    },
    /// Run a contract test on the TXE
    Txe {
        /// Compiled test artifact
        test: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum CvmCommand {
    Run {
        #[arg(long = "artifact_path")]
        artifact_path: PathBuf,
        #[arg(long = "calldata_path")]
        calldata_path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Fault {
    /// Print a fatal error and exit with status 101
    Crash,
    /// Read requests but never answer them
    Silent,
}

impl Cli {
    pub fn run(&self) -> miette::Result<ExitCode> {
        let program = self.program();

        if !self.debug_dap {
            println!("{}: ok (pass --debug-dap to debug it)", program.name);
            return Ok(ExitCode::SUCCESS);
        }

        match self.fault {
            Some(Fault::Crash) => {
                eprintln!("fatal: simulated crash while loading {}", program.name);
                return Ok(ExitCode::from(CRASH_EXIT_CODE));
            }
            Some(Fault::Silent) => {
                init_tracing();
                server::swallow().into_diagnostic()?;
                return Ok(ExitCode::SUCCESS);
            }
            None => {}
        }

        init_tracing();
        server::start(program).into_diagnostic()?;
        Ok(ExitCode::SUCCESS)
    }

    fn program(&self) -> Program {
        match &self.target {
            Target::Cvm {
                command: CvmCommand::Run { artifact_path, .. },
            } => Program::cvm(artifact_path),
            Target::Txe { test } => Program::txe(test),
        }
    }

    pub fn artifact(&self) -> &Path {
        match &self.target {
            Target::Cvm {
                command: CvmCommand::Run { artifact_path, .. },
            } => artifact_path,
            Target::Txe { test } => test,
        }
    }
}

/// Logs go to stderr; stdout carries the protocol.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::program::Kind;

    #[rstest]
    #[case::cvm(
        &["zb-dap-mock", "cvm", "run", "--artifact_path", "./simple_test/target/simple_test.json", "--calldata_path", "./simple_test/Prover.toml", "--debug-dap"],
        Kind::Cvm,
        "simple_test"
    )]
    #[case::txe(
        &["zb-dap-mock", "txe", "./target/tests/Counter__pass.json", "--debug-dap"],
        Kind::Txe,
        "Counter__pass"
    )]
    fn test_parse_targets(#[case] args: &[&str], #[case] kind: Kind, #[case] name: &str) {
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.debug_dap);
        assert_eq!(cli.fault, None);
        let program = cli.program();
        assert_eq!(program.kind, kind);
        assert_eq!(program.name, name);
    }

    #[test]
    fn test_parse_fault() {
        let cli = Cli::try_parse_from(["zb-dap-mock", "txe", "t.json", "--debug-dap", "--fault", "silent"]).unwrap();
        assert_eq!(cli.fault, Some(Fault::Silent));
        assert_eq!(cli.artifact(), Path::new("t.json"));
    }

    #[test]
    fn test_cvm_requires_artifact() {
        assert!(Cli::try_parse_from(["zb-dap-mock", "cvm", "run", "--debug-dap"]).is_err());
    }
}
