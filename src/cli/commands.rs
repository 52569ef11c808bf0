//! CLI commands and argument parsing

use crate::transform::DecoderFormat;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Streaming HTTP GET fetcher
#[derive(Parser, Debug)]
#[command(name = "streamfetch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Fetch configuration file (YAML or JSON)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stream a resource to stdout
    Get(GetArgs),
}

/// Arguments of `get`; each one overrides the config file
#[derive(Args, Debug, Default)]
pub struct GetArgs {
    /// URL to fetch (falls back to the config file's `url`)
    pub url: Option<String>,

    /// Query parameter as `key=value` (repeatable)
    #[arg(short, long = "query", value_name = "KEY=VALUE")]
    pub query: Vec<String>,

    /// Header as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
    pub headers: Vec<String>,

    /// Fail on transport and decode errors instead of ending the page
    #[arg(long)]
    pub abort_on_error: bool,

    /// Re-issues allowed per page
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Body decoder
    #[arg(short, long)]
    pub decoder: Option<DecoderArg>,

    /// Path to the records in a JSON body (e.g. `$.data`)
    #[arg(long)]
    pub record_path: Option<String>,

    /// Query parameter carrying the cursor
    #[arg(long, requires = "cursor_path")]
    pub cursor_param: Option<String>,

    /// Path to the next cursor in the page
    #[arg(long, requires = "cursor_param")]
    pub cursor_path: Option<String>,

    /// Path to the next page URL in the page
    #[arg(long, conflicts_with_all = ["cursor_param", "page_param"])]
    pub next_url_path: Option<String>,

    /// Query parameter carrying the page number
    #[arg(long, conflicts_with = "cursor_param")]
    pub page_param: Option<String>,
}

/// Body decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DecoderArg {
    /// Raw bytes, written as-is
    Raw,
    /// One JSON document per page
    Json,
    /// JSON Lines
    Jsonl,
    /// Text lines
    Lines,
}

impl From<DecoderArg> for DecoderFormat {
    fn from(arg: DecoderArg) -> Self {
        match arg {
            DecoderArg::Raw => DecoderFormat::Raw,
            DecoderArg::Json => DecoderFormat::Json,
            DecoderArg::Jsonl => DecoderFormat::Jsonl,
            DecoderArg::Lines => DecoderFormat::Lines,
        }
    }
}
