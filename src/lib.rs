pub mod ancestry;
pub mod cli;
pub mod commands;
pub mod docker;
pub mod error;
pub mod git;
pub mod logging;
pub mod output;
pub mod platform;
pub mod report;
pub mod resolve;
pub mod tree;
pub mod types;

pub use cli::Cli;

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use anyhow::Result;
use clap::CommandFactory;

pub fn run(cli: Cli) -> Result<ExitCode> {
    let settings = cli.settings();
    if !settings.color {
        colored::control::set_override(false);
    }
    logging::init(settings.verbosity, settings.color && io::stderr().is_terminal());

    if let Some(cli::Commands::Completions { shell }) = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "witr", &mut io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let Some(target) = cli.target() else {
        anyhow::bail!("no target given: pass a process name, --pid <PID> or --port <PORT>");
    };

    if commands::why::execute(&target, &settings)? {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
