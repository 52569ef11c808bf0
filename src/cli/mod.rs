//! CLI module
//!
//! Command-line interface for fetching resources.
//!
//! # Commands
//!
//! - `get` - Stream a URL (optionally paginated) to stdout

mod commands;
mod runner;

pub use commands::{Cli, Commands, DecoderArg, GetArgs};
pub use runner::Runner;
