//! Maps validated CLI matches to an action.

use crate::cli::{
    actions::{shell, status, Action},
    commands::{client, CMD_SHELL, CMD_STATUS},
};
use anyhow::{anyhow, Result};

/// # Errors
/// Returns an error if the subcommand is unknown or its arguments are inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    match matches.subcommand() {
        Some((CMD_SHELL, sub)) => Ok(Action::Shell(shell::Args {
            options: client::Options::parse(sub)?,
        })),
        Some((CMD_STATUS, sub)) => Ok(Action::Status(status::Args {
            options: client::Options::parse(sub)?,
        })),
        Some((name, _)) => Err(anyhow!("unknown command: {name}")),
        None => Err(anyhow!("missing command")),
    }
}
