//! CLI module for epistream
//!
//! Provides command-line interface for:
//! - query: connect, run one query, print its result sets
//! - check-config: validate a configuration file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_config, query, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_json, write_response};
