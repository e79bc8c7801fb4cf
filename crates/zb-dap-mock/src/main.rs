use std::process::ExitCode;

use clap::Parser;
use zb_dap_mock::Cli;

fn main() -> miette::Result<ExitCode> {
    Cli::parse().run()
}
