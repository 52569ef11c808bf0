// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # streamfetch
//!
//! Streaming HTTP GET fetcher. A remote resource's body is exposed as a lazily
//! pulled, backpressure-respecting [`Stream`](futures::Stream) of chunks,
//! either for a single request or chained across pages.
//!
//! ## Features
//!
//! - **Lazy**: nothing is requested before the first poll
//! - **Backpressure**: the body is only read as fast as the consumer pulls
//! - **Response policies**: 404 is empty, 429 retries, pluggable classification
//! - **Transforms**: JSON, JSON Lines and line splitting per page
//! - **Pagination**: cursor, next URL, page number, offset, or any closure
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use futures::StreamExt;
//! use streamfetch::{paginate, DecoderConfig, NextUrlContinuation, StreamOptions, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let options = StreamOptions::default()
//!         .transform(DecoderConfig::json_with_path("results").factory().unwrap());
//!
//!     let mut records = paginate(
//!         "https://api.example.com/v1/items",
//!         NextUrlContinuation::new("next"),
//!         options,
//!     )?;
//!
//!     while let Some(chunk) = records.next().await {
//!         println!("{:?}", chunk?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │        SingleRequestStreamer          PaginatedStreamer         │
//! │              Stream<Item = Result<Chunk>>                       │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//!                  PageDriver (one request, one page)
//!                                │
//! ┌───────────────┬──────────────┴─┬────────────────┬──────────────┐
//! │   Transport   │    Policy      │   Transform    │ Continuation │
//! ├───────────────┼────────────────┼────────────────┼──────────────┤
//! │ reqwest       │ Default        │ JSON           │ Cursor       │
//! │ Rate Limit    │ Backoff        │ JSON Lines     │ Next URL     │
//! │ Timeout/gzip  │ Closures       │ Lines          │ Page Number  │
//! │               │                │                │ Offset       │
//! └───────────────┴────────────────┴────────────────┴──────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Stream options and file-backed fetch configuration
pub mod config;

/// HTTP transport with rate limiting
pub mod http;

/// Response classification policies
pub mod policy;

/// Body transforms (JSON, JSON Lines, lines)
pub mod transform;

/// Pagination continuations
pub mod pagination;

/// Single and paginated streamers
pub mod stream;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{FetchConfig, StreamOptions};
pub use error::{Error, Result};
pub use http::{ReqwestTransport, Transport, TransportConfig};
pub use pagination::{
    Continuation, CursorContinuation, NextUrlContinuation, OffsetContinuation,
    PageNumberContinuation, PaginationConfig, StopCondition,
};
pub use policy::{BackoffPolicy, DefaultPolicy, ResponsePolicy, Verdict};
pub use stream::{PaginatedStreamer, SingleRequestStreamer};
pub use transform::{DecoderConfig, Transform, TransformFactory};
pub use types::*;

use std::sync::Arc;

/// Stream the body of `url` over the default transport
pub fn stream(url: &str, options: StreamOptions) -> Result<SingleRequestStreamer> {
    let transport = Arc::new(ReqwestTransport::new()?);
    SingleRequestStreamer::new(transport, url, options)
}

/// Stream `url` and every page `continuation` leads to over the default transport
pub fn paginate(
    url: &str,
    continuation: impl Continuation + 'static,
    options: StreamOptions,
) -> Result<PaginatedStreamer> {
    let transport = Arc::new(ReqwestTransport::new()?);
    PaginatedStreamer::new(transport, url, continuation, options)
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
