//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, GetArgs};
use crate::config::FetchConfig;
use crate::error::{Error, Result};
use crate::http::ReqwestTransport;
use crate::pagination::{PaginationConfig, StopCondition};
use crate::stream::{PaginatedStreamer, SingleRequestStreamer};
use crate::transform::DecoderFormat;
use crate::types::Chunk;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Get(args) => self.get(args).await,
        }
    }

    /// Stream the resource to stdout
    async fn get(&self, args: &GetArgs) -> Result<()> {
        let config = self.fetch_config(args)?;
        debug!("Resolved fetch config: {config:?}");

        let transport = Arc::new(ReqwestTransport::with_config(config.transport_config())?);
        let request = config.request()?;
        let options = config.stream_options();
        let url = request.url.clone();

        let mut chunks: BoxStream<'static, Result<Chunk>> = match config.continuation() {
            Some(continuation) => {
                PaginatedStreamer::from_request(transport, request, continuation, options).boxed()
            }
            None => SingleRequestStreamer::from_request(transport, request, options).boxed(),
        };

        let newline_after_bytes = config.decoder.format == DecoderFormat::Lines;
        let mut out = std::io::BufWriter::new(std::io::stdout());
        let start = Instant::now();
        let mut count = 0usize;

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    out.flush()?;
                    return Err(e);
                }
            };
            count += 1;

            match chunk {
                Chunk::Bytes(bytes) => {
                    out.write_all(&bytes)?;
                    if newline_after_bytes {
                        out.write_all(b"\n")?;
                    }
                }
                Chunk::Object(value) => {
                    serde_json::to_writer(&mut out, &value)?;
                    out.write_all(b"\n")?;
                }
            }
        }
        out.flush()?;

        info!(
            "GET {url}: {count} chunks in {:.2}s",
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }

    /// Load the config file (if any) and apply command-line overrides
    fn fetch_config(&self, args: &GetArgs) -> Result<FetchConfig> {
        let mut config = match &self.cli.config {
            Some(path) => FetchConfig::from_path(path)?,
            None => FetchConfig::default(),
        };
        apply_args(&mut config, args)?;

        if config.url.is_none() {
            return Err(Error::config(
                "No URL given (pass one or set `url` in the config file)",
            ));
        }
        Ok(config)
    }
}

/// Merge `get` arguments into a config; arguments win
fn apply_args(config: &mut FetchConfig, args: &GetArgs) -> Result<()> {
    if let Some(url) = &args.url {
        config.url = Some(url.clone());
    }
    for pair in &args.query {
        let (key, value) = split_pair(pair, '=')?;
        config.query.insert(key, value);
    }
    for pair in &args.headers {
        let (key, value) = split_pair(pair, ':')?;
        config.headers.insert(key, value);
    }

    if args.abort_on_error {
        config.abort_on_error = true;
    }
    if args.max_retries.is_some() {
        config.max_retries = args.max_retries;
    }
    if let Some(decoder) = args.decoder {
        config.decoder.format = decoder.into();
    }
    if let Some(path) = &args.record_path {
        config.decoder.record_path = Some(path.clone());
    }

    if let (Some(cursor_param), Some(cursor_path)) = (&args.cursor_param, &args.cursor_path) {
        config.pagination = PaginationConfig::Cursor {
            cursor_param: cursor_param.clone(),
            cursor_path: cursor_path.clone(),
            stop: StopCondition::Never,
        };
    } else if let Some(path) = &args.next_url_path {
        config.pagination = PaginationConfig::NextUrl { path: path.clone() };
    } else if let Some(page_param) = &args.page_param {
        config.pagination = PaginationConfig::PageNumber {
            page_param: page_param.clone(),
            start_page: 1,
            page_size_param: None,
            page_size: None,
            stop: StopCondition::default(),
        };
    }

    // Pagination reads the page result, which only the JSON decoder provides
    if config.pagination.is_paginated() && config.decoder.format == DecoderFormat::Raw {
        config.decoder.format = DecoderFormat::Json;
    }
    Ok(())
}

/// Split `key<sep>value`, trimming both sides
fn split_pair(pair: &str, separator: char) -> Result<(String, String)> {
    let (key, value) = pair
        .split_once(separator)
        .ok_or_else(|| Error::config(format!("Expected `key{separator}value`, got `{pair}`")))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(Error::config(format!("Empty key in `{pair}`")));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
