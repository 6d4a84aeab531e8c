//! Command dispatch: bridges CLI args -> core engines -> output formatting.

pub mod config_cmd;
pub mod hosts;
pub mod stats;

use std::path::Path;

use serde::de::DeserializeOwned;

use hostlink_config::Config;

use crate::cli::{Command, OutputFormat};
use crate::error::CliError;

/// Everything a handler needs besides its own arguments.
pub struct Context {
    pub config: Config,
    pub format: OutputFormat,
    pub quiet: bool,
    pub color: bool,
}

/// Dispatch a replay command to the appropriate handler.
pub fn dispatch(cmd: Command, ctx: &Context) -> Result<(), CliError> {
    match cmd {
        Command::Hosts(args) => hosts::handle(args, ctx),
        Command::Stats(args) => stats::handle(args, ctx),
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}

/// Read a file holding a JSON array of `T`.
pub(crate) fn read_json_array<T: DeserializeOwned>(
    path: &Path,
    expected: &'static str,
) -> Result<Vec<T>, CliError> {
    let contents = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| CliError::Json {
        path: path.display().to_string(),
        expected,
        source,
    })
}
