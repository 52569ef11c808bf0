//! Common types used throughout streamfetch
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use crate::error::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// Generic key-value map with string keys and values
pub type StringMap = HashMap<String, String>;

// ============================================================================
// Request Descriptor
// ============================================================================

/// Everything needed to issue one GET request.
///
/// A streamer keeps its own copy of the descriptor; the pagination
/// continuation receives a clone and may rewrite it for the next page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// Target URL
    pub url: Url,
    /// Query parameters appended to the URL
    #[serde(default)]
    pub query: StringMap,
    /// Request headers
    #[serde(default)]
    pub headers: StringMap,
}

impl RequestDescriptor {
    /// Create a descriptor for the given URL
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self::from_url(Url::parse(url)?))
    }

    /// Create a descriptor from an already parsed URL
    pub fn from_url(url: Url) -> Self {
        Self {
            url,
            query: StringMap::new(),
            headers: StringMap::new(),
        }
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Replace the URL, resolving relative references against the current one
    pub fn set_url(&mut self, url: &str) -> Result<()> {
        self.url = self.url.join(url)?;
        Ok(())
    }
}

// ============================================================================
// Chunks
// ============================================================================

/// One item of the output sequence
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    /// Raw body bytes
    Bytes(Bytes),
    /// A value produced by an object-mode transform
    Object(JsonValue),
}

impl Chunk {
    /// Borrow the raw bytes, if this is a byte chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Chunk::Bytes(bytes) => Some(bytes),
            Chunk::Object(_) => None,
        }
    }

    /// Borrow the object, if this is an object chunk
    pub fn as_object(&self) -> Option<&JsonValue> {
        match self {
            Chunk::Object(value) => Some(value),
            Chunk::Bytes(_) => None,
        }
    }

    /// Check if this chunk carries an object
    pub fn is_object(&self) -> bool {
        matches!(self, Chunk::Object(_))
    }
}

impl From<Bytes> for Chunk {
    fn from(bytes: Bytes) -> Self {
        Chunk::Bytes(bytes)
    }
}

impl From<JsonValue> for Chunk {
    fn from(value: JsonValue) -> Self {
        Chunk::Object(value)
    }
}

// ============================================================================
// Stream State
// ============================================================================

/// Observable lifecycle state of a streamer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Nothing has been requested yet
    Idle,
    /// A request is in flight
    Requesting,
    /// Waiting on a deferred policy decision before re-issuing the request
    Retrying,
    /// Body chunks are flowing
    Streaming,
    /// Waiting on the pagination continuation
    Completing,
    /// End of sequence reached
    Terminal,
    /// A fatal error was raised or the stream was destroyed with a reason
    Failed,
}

impl StreamState {
    /// Check if no more items will be produced (besides a pending error)
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Terminal | Self::Failed)
    }
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Delay growth between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}
