//! Body transform module
//!
//! Supports: JSON document, JSON Lines, plain lines
//!
//! # Overview
//!
//! A transform sits between the response body and the stream output. It is
//! pushed raw body chunks as they are pulled, may emit any number of output
//! chunks per input, and on end of input may hand back one aggregated page
//! result, which the paginated streamer passes to its continuation.
//!
//! Transforms are single-use: the paginated streamer builds a fresh one per
//! page through a [`TransformFactory`].

mod decoders;
mod types;

pub use decoders::{select_all, select_path, JsonLinesTransform, JsonTransform, LinesTransform};
pub use types::{factory, DecoderConfig, DecoderFormat, Transform, TransformFactory};
