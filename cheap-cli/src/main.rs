//! ## cheap-cli
//! **Command-line front end for cursor arenas**
//!
//! Probes DAX device sizes and smoke-tests arenas built from configuration.

use clap::Parser;

mod commands;
mod error;

use commands::Cli;
use error::CliError;

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    commands::run_command(cli)
}
