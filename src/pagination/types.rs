//! Pagination types and traits
//!
//! Defines the continuation contract and the serializable pagination config.

use super::strategies::{
    CursorContinuation, NextUrlContinuation, OffsetContinuation, PageNumberContinuation,
};
use crate::error::Result;
use crate::transform::select_path;
use crate::types::RequestDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Decides whether another page follows, and how to request it.
///
/// Called once per page after its body (and transform) completed, with a copy
/// of the current request and the page result. Returning `Ok(true)` makes the
/// (possibly rewritten) request the next page; `Ok(false)` ends the stream.
/// An `Err` also ends the stream cleanly; it is logged, never surfaced.
#[async_trait]
pub trait Continuation: Send {
    /// Inspect the finished page and prepare the next one
    async fn next_page(&mut self, page: &mut RequestDescriptor, data: Option<&Value>)
        -> Result<bool>;
}

#[async_trait]
impl<F> Continuation for F
where
    F: FnMut(&mut RequestDescriptor, Option<&Value>) -> Result<bool> + Send,
{
    async fn next_page(
        &mut self,
        page: &mut RequestDescriptor,
        data: Option<&Value>,
    ) -> Result<bool> {
        self(page, data)
    }
}

// ============================================================================
// Stop Conditions
// ============================================================================

/// When a counting strategy should stop asking for pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopCondition {
    /// Only stop when there is no page result
    Never,

    /// Stop when the records array is empty or missing
    EmptyPage {
        /// Path to the records array; the whole page result when absent
        #[serde(default)]
        records_path: Option<String>,
    },

    /// Stop when a field has a specific value
    Field {
        /// Path to the field
        path: String,
        /// Value that means "no more pages"
        value: Value,
    },

    /// Stop once the page just fetched is the last one
    TotalPages {
        /// Path to the total pages field
        path: String,
    },
}

impl Default for StopCondition {
    fn default() -> Self {
        Self::EmptyPage { records_path: None }
    }
}

impl StopCondition {
    /// Stop on an empty records array at `records_path`
    pub fn empty_page(records_path: impl Into<String>) -> Self {
        Self::EmptyPage {
            records_path: Some(records_path.into()),
        }
    }

    /// Create a field-based stop condition
    pub fn field(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Field {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Create a total pages stop condition
    pub fn total_pages(path: impl Into<String>) -> Self {
        Self::TotalPages { path: path.into() }
    }

    /// Check whether pagination should stop after `page` produced `data`
    pub fn should_stop(&self, data: &Value, page: u64) -> bool {
        match self {
            Self::Never => false,
            Self::EmptyPage { records_path } => {
                let records = match records_path {
                    Some(path) => select_path(data, path),
                    None => Some(data),
                };
                match records {
                    Some(Value::Array(items)) => items.is_empty(),
                    Some(Value::Null) | None => true,
                    Some(_) => false,
                }
            }
            Self::Field { path, value } => select_path(data, path) == Some(value),
            Self::TotalPages { path } => select_path(data, path)
                .and_then(value_as_u64)
                .is_some_and(|total| page >= total),
        }
    }
}

/// Read a scalar as a non-empty string
pub(crate) fn value_as_string(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

// ============================================================================
// Pagination Config
// ============================================================================

/// Pagination configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaginationConfig {
    /// Single request
    #[default]
    None,

    /// Cursor read from the page result, sent as a query parameter
    Cursor {
        /// Query parameter name for the cursor
        cursor_param: String,
        /// Path to the next cursor in the page result
        cursor_path: String,
        /// Stop condition
        #[serde(default = "never")]
        stop: StopCondition,
    },

    /// Next page URL read from the page result
    NextUrl {
        /// Path to the next URL
        path: String,
    },

    /// Incrementing page number
    PageNumber {
        /// Query parameter name for the page number
        page_param: String,
        /// First page number (usually 0 or 1)
        #[serde(default = "default_start_page")]
        start_page: u64,
        /// Query parameter name for the page size
        #[serde(default)]
        page_size_param: Option<String>,
        /// Records per page, sent with `page_size_param`
        #[serde(default)]
        page_size: Option<u64>,
        /// Stop condition
        #[serde(default)]
        stop: StopCondition,
    },

    /// Offset and limit
    Offset {
        /// Query parameter name for the offset
        offset_param: String,
        /// Query parameter name for the limit
        limit_param: String,
        /// Records per page
        limit: u64,
        /// Path to the records array in the page result
        #[serde(default)]
        records_path: Option<String>,
    },
}

fn never() -> StopCondition {
    StopCondition::Never
}

fn default_start_page() -> u64 {
    1
}

impl PaginationConfig {
    /// Check if this config fetches more than one page
    pub fn is_paginated(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Add the first page's parameters to the initial request
    pub fn prepare(&self, request: RequestDescriptor) -> RequestDescriptor {
        match self {
            Self::PageNumber {
                page_param,
                start_page,
                page_size_param,
                page_size,
                ..
            } => {
                let request = request.query(page_param, start_page.to_string());
                match (page_size_param, page_size) {
                    (Some(param), Some(size)) => request.query(param, size.to_string()),
                    _ => request,
                }
            }
            Self::Offset {
                offset_param,
                limit_param,
                limit,
                ..
            } => request
                .query(offset_param, "0")
                .query(limit_param, limit.to_string()),
            Self::None | Self::Cursor { .. } | Self::NextUrl { .. } => request,
        }
    }

    /// Build the continuation, `None` when not paginated
    pub fn continuation(&self) -> Option<Box<dyn Continuation>> {
        match self {
            Self::None => None,
            Self::Cursor {
                cursor_param,
                cursor_path,
                stop,
            } => Some(Box::new(
                CursorContinuation::new(cursor_param, cursor_path).with_stop_condition(stop.clone()),
            )),
            Self::NextUrl { path } => Some(Box::new(NextUrlContinuation::new(path))),
            Self::PageNumber {
                page_param,
                start_page,
                page_size_param,
                page_size,
                stop,
            } => {
                let mut continuation = PageNumberContinuation::new(page_param, *start_page)
                    .with_stop_condition(stop.clone());
                if let (Some(param), Some(size)) = (page_size_param, page_size) {
                    continuation = continuation.with_page_size(param, *size);
                }
                Some(Box::new(continuation))
            }
            Self::Offset {
                offset_param,
                limit_param,
                limit,
                records_path,
            } => {
                let mut continuation = OffsetContinuation::new(offset_param, limit_param, *limit);
                if let Some(path) = records_path {
                    continuation = continuation.with_records_path(path);
                }
                Some(Box::new(continuation))
            }
        }
    }
}
