//! Command Line Interface module
//!
//! Headless front end for the wizard: argument parsing, the command
//! implementations and a printer for controller events.

pub mod args;
pub mod commands;
pub mod session;

pub use args::*;

use anyhow::Result;

/// Main CLI application runner
pub async fn run(cli: Cli) -> Result<()> {
    commands::execute_command(cli.command.clone(), &cli).await
}
