//! Transform types and traits
//!
//! Defines the transform stage contract and the serializable decoder config
//! that builds the built-in stages.

use super::decoders::{JsonLinesTransform, JsonTransform, LinesTransform};
use crate::error::Result;
use crate::types::Chunk;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A push/pull stage reshaping body chunks
pub trait Transform: Send {
    /// Feed one body chunk, appending any chunks it produces to `output`
    fn push(&mut self, chunk: Bytes, output: &mut Vec<Chunk>) -> Result<()>;

    /// Signal end of input.
    ///
    /// Appends trailing chunks to `output` and returns the aggregated page
    /// result, if the stage computes one.
    fn finish(&mut self, output: &mut Vec<Chunk>) -> Result<Option<Value>>;
}

/// Builds a fresh transform for every page
pub type TransformFactory = Arc<dyn Fn() -> Box<dyn Transform> + Send + Sync>;

/// Wrap a constructor closure into a [`TransformFactory`]
pub fn factory<T, F>(make: F) -> TransformFactory
where
    T: Transform + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Arc::new(move || Box::new(make()) as Box<dyn Transform>)
}

/// Format of the response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderFormat {
    /// Pass bytes through untouched (default)
    #[default]
    Raw,
    /// One JSON document per page
    Json,
    /// JSON Lines format (one JSON value per line)
    Jsonl,
    /// Newline separated text, one chunk per line
    Lines,
}

/// Configuration for the built-in transforms
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Body format
    #[serde(default)]
    pub format: DecoderFormat,
    /// Dotted path to the records inside a JSON document
    #[serde(default)]
    pub record_path: Option<String>,
}

impl DecoderConfig {
    /// Create a JSON decoder config
    pub fn json() -> Self {
        Self {
            format: DecoderFormat::Json,
            ..Default::default()
        }
    }

    /// Create a JSON decoder config with a record path
    pub fn json_with_path(path: impl Into<String>) -> Self {
        Self {
            format: DecoderFormat::Json,
            record_path: Some(path.into()),
        }
    }

    /// Create a JSONL decoder config
    pub fn jsonl() -> Self {
        Self {
            format: DecoderFormat::Jsonl,
            ..Default::default()
        }
    }

    /// Create a line splitting config
    pub fn lines() -> Self {
        Self {
            format: DecoderFormat::Lines,
            ..Default::default()
        }
    }

    /// Build a factory for the configured transform, `None` for raw bodies
    pub fn factory(&self) -> Option<TransformFactory> {
        match self.format {
            DecoderFormat::Raw => None,
            DecoderFormat::Json => {
                let path = self.record_path.clone();
                Some(factory(move || match &path {
                    Some(path) => JsonTransform::with_path(path.clone()),
                    None => JsonTransform::new(),
                }))
            }
            DecoderFormat::Jsonl => Some(factory(JsonLinesTransform::new)),
            DecoderFormat::Lines => Some(factory(LinesTransform::new)),
        }
    }
}
