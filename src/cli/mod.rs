//! CLI module for tabvault
//!
//! Provides command-line interface for:
//! - serve: Boot storage and serve the HTTP API (default)
//! - migrate: One-time copy of file state into the relational backend
//! - summary: Per-tab row counts of the current dataset

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, HttpArgs, StorageArgs};
pub use commands::{migrate, run, run_command, serve, summary};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::write_response;
