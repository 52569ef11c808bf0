//! Response classification module
//!
//! Decides, per response, whether the body is consumed, the request is
//! re-issued, or the stream fails.
//!
//! # Overview
//!
//! - `DefaultPolicy`: 200/404 accept, 429 retry, everything else fails
//! - `BackoffPolicy`: same verdicts, but waits before each retry using
//!   `Retry-After` or a configured backoff curve
//! - Any `Fn(&ResponseMeta, &RequestDescriptor) -> Result<Verdict>` closure

mod handlers;
mod types;

pub use handlers::{BackoffPolicy, DefaultPolicy};
pub use types::{ResponsePolicy, Verdict};
