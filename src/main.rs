use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<ExitCode> {
    let cli = witr::Cli::parse();
    witr::run(cli)
}
