//! Policy types and traits

use crate::error::Result;
use crate::http::ResponseMeta;
use crate::types::RequestDescriptor;
use futures::future::BoxFuture;

/// Outcome of classifying a response
pub enum Verdict {
    /// Consume the body
    Accept,
    /// Discard the response and re-issue the same request right away
    Retry,
    /// Discard the response, wait for the future, then decide.
    ///
    /// The future must resolve to `false` (re-issue the request). Resolving to
    /// `true` means the policy tried to accept a response it already threw
    /// away, and fails the stream.
    Defer(BoxFuture<'static, Result<bool>>),
}

impl Verdict {
    /// Check if the body should be consumed
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

impl std::fmt::Debug for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accept => f.write_str("Accept"),
            Self::Retry => f.write_str("Retry"),
            Self::Defer(_) => f.write_str("Defer(..)"),
        }
    }
}

/// Classifies responses for a streamer
///
/// Returning `Err` fails the stream regardless of `abort_on_error`.
pub trait ResponsePolicy: Send + Sync {
    /// Classify one response of the in-flight request
    fn classify(&self, response: &ResponseMeta, request: &RequestDescriptor) -> Result<Verdict>;
}

impl<F> ResponsePolicy for F
where
    F: Fn(&ResponseMeta, &RequestDescriptor) -> Result<Verdict> + Send + Sync,
{
    fn classify(&self, response: &ResponseMeta, request: &RequestDescriptor) -> Result<Verdict> {
        self(response, request)
    }
}
