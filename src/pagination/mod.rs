//! Pagination module
//!
//! Supports: Cursor, Next URL, Page Number, Offset, or any closure
//!
//! # Overview
//!
//! The paginated streamer asks a [`Continuation`] after every page whether
//! another page follows. The strategies here cover the common API patterns by
//! reading the page result produced by a JSON transform.

mod strategies;
mod types;

pub use strategies::{
    CursorContinuation, NextUrlContinuation, OffsetContinuation, PageNumberContinuation,
};
pub use types::{Continuation, PaginationConfig, StopCondition};
