//! Continuation strategy implementations
//!
//! Each strategy reads the JSON page result of the page just fetched and
//! rewrites the request for the next one. A page without a result (no
//! transform, empty body, failed page) ends pagination.

use super::types::{value_as_string, Continuation, StopCondition};
use crate::error::{Error, Result};
use crate::transform::select_path;
use crate::types::RequestDescriptor;
use async_trait::async_trait;
use serde_json::Value;

// ============================================================================
// Cursor
// ============================================================================

/// Cursor-based pagination (e.g., Stripe, Slack)
///
/// Common patterns:
/// - `?starting_after=obj_123`
/// - `?cursor=abc123`
#[derive(Debug, Clone)]
pub struct CursorContinuation {
    cursor_param: String,
    cursor_path: String,
    stop_condition: StopCondition,
}

impl CursorContinuation {
    /// Create a new cursor continuation; stops when the cursor runs out
    pub fn new(cursor_param: impl Into<String>, cursor_path: impl Into<String>) -> Self {
        Self {
            cursor_param: cursor_param.into(),
            cursor_path: cursor_path.into(),
            stop_condition: StopCondition::Never,
        }
    }

    /// Set an additional stop condition
    #[must_use]
    pub fn with_stop_condition(mut self, condition: StopCondition) -> Self {
        self.stop_condition = condition;
        self
    }
}

#[async_trait]
impl Continuation for CursorContinuation {
    async fn next_page(
        &mut self,
        page: &mut RequestDescriptor,
        data: Option<&Value>,
    ) -> Result<bool> {
        let Some(data) = data else {
            return Ok(false);
        };
        if self.stop_condition.should_stop(data, 0) {
            return Ok(false);
        }

        match select_path(data, &self.cursor_path).and_then(value_as_string) {
            Some(cursor) => {
                page.query.insert(self.cursor_param.clone(), cursor);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

// ============================================================================
// Next URL
// ============================================================================

/// Next URL in the response body
///
/// Common patterns:
/// - `{ "next": "https://api.example.com/items?page=2" }`
/// - `{ "pagination": { "next_url": "/items?page=2" } }`
///
/// Relative URLs resolve against the current one. The query map is cleared,
/// since next URLs carry their own.
#[derive(Debug, Clone)]
pub struct NextUrlContinuation {
    path: String,
}

impl NextUrlContinuation {
    /// Create a new next URL continuation
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Continuation for NextUrlContinuation {
    async fn next_page(
        &mut self,
        page: &mut RequestDescriptor,
        data: Option<&Value>,
    ) -> Result<bool> {
        let Some(next) = data
            .and_then(|d| select_path(d, &self.path))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        else {
            return Ok(false);
        };

        page.set_url(next)?;
        page.query.clear();
        Ok(true)
    }
}

// ============================================================================
// Page Number
// ============================================================================

/// Page number pagination (`?page=2`)
#[derive(Debug, Clone)]
pub struct PageNumberContinuation {
    page_param: String,
    current: u64,
    page_size: Option<(String, u64)>,
    stop_condition: StopCondition,
}

impl PageNumberContinuation {
    /// Create a continuation whose first request carries `start_page`
    pub fn new(page_param: impl Into<String>, start_page: u64) -> Self {
        Self {
            page_param: page_param.into(),
            current: start_page,
            page_size: None,
            stop_condition: StopCondition::default(),
        }
    }

    /// Send a fixed page size with every follow-up page
    #[must_use]
    pub fn with_page_size(mut self, param: impl Into<String>, size: u64) -> Self {
        self.page_size = Some((param.into(), size));
        self
    }

    /// Set stop condition
    #[must_use]
    pub fn with_stop_condition(mut self, condition: StopCondition) -> Self {
        self.stop_condition = condition;
        self
    }
}

#[async_trait]
impl Continuation for PageNumberContinuation {
    async fn next_page(
        &mut self,
        page: &mut RequestDescriptor,
        data: Option<&Value>,
    ) -> Result<bool> {
        let Some(data) = data else {
            return Ok(false);
        };
        if self.stop_condition.should_stop(data, self.current) {
            return Ok(false);
        }

        self.current += 1;
        page.query
            .insert(self.page_param.clone(), self.current.to_string());
        if let Some((param, size)) = &self.page_size {
            page.query.insert(param.clone(), size.to_string());
        }
        Ok(true)
    }
}

// ============================================================================
// Offset
// ============================================================================

/// Offset-based pagination (`?offset=100&limit=50`)
///
/// Stops on the first page returning fewer than `limit` records.
#[derive(Debug, Clone)]
pub struct OffsetContinuation {
    offset_param: String,
    limit_param: String,
    limit: u64,
    offset: u64,
    records_path: Option<String>,
}

impl OffsetContinuation {
    /// Create a new offset continuation starting at offset 0
    pub fn new(offset_param: impl Into<String>, limit_param: impl Into<String>, limit: u64) -> Self {
        Self {
            offset_param: offset_param.into(),
            limit_param: limit_param.into(),
            limit,
            offset: 0,
            records_path: None,
        }
    }

    /// Count records at this path instead of the whole page result
    #[must_use]
    pub fn with_records_path(mut self, path: impl Into<String>) -> Self {
        self.records_path = Some(path.into());
        self
    }
}

#[async_trait]
impl Continuation for OffsetContinuation {
    async fn next_page(
        &mut self,
        page: &mut RequestDescriptor,
        data: Option<&Value>,
    ) -> Result<bool> {
        if self.limit == 0 {
            return Err(Error::config("offset pagination needs a non-zero limit"));
        }

        let records = data.and_then(|d| match &self.records_path {
            Some(path) => select_path(d, path),
            None => Some(d),
        });
        let count = match records {
            Some(Value::Array(items)) => items.len() as u64,
            _ => 0,
        };
        if count < self.limit {
            return Ok(false);
        }

        self.offset += self.limit;
        page.query
            .insert(self.offset_param.clone(), self.offset.to_string());
        page.query
            .insert(self.limit_param.clone(), self.limit.to_string());
        Ok(true)
    }
}
