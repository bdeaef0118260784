//! CLI module for dirpart
//!
//! Every command runs against a JSON directory snapshot:
//! - init: write a new snapshot from a list of servers
//! - partition: create, find, delete, list servers, edit replicas
//! - link: create, show, change, delete site links

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, LinkCommand, PartitionCommand, TargetArgs, TargetKind, TechnologyArg};
pub use commands::{parse_server_spec, parse_window, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{error_envelope, ok_envelope, write_error, write_response};
