use std::process::ExitCode;

use clap::Parser;
use zb_dap_runner::Cli;

fn main() -> miette::Result<ExitCode> {
    Cli::parse().run()
}
