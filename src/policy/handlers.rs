//! Built-in response policies

use super::types::{ResponsePolicy, Verdict};
use crate::error::{Error, Result};
use crate::http::ResponseMeta;
use crate::types::{BackoffType, RequestDescriptor};
use futures::FutureExt;
use reqwest::StatusCode;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::warn;

// ============================================================================
// Default Policy
// ============================================================================

/// 200 and 404 accept, 429 retries immediately, anything else fails.
///
/// A 404 is an empty resource, not an error: its body (usually empty) is
/// streamed like any other.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl ResponsePolicy for DefaultPolicy {
    fn classify(&self, response: &ResponseMeta, _request: &RequestDescriptor) -> Result<Verdict> {
        match response.status {
            StatusCode::OK | StatusCode::NOT_FOUND => Ok(Verdict::Accept),
            StatusCode::TOO_MANY_REQUESTS => Ok(Verdict::Retry),
            status => Err(unexpected(status, response)),
        }
    }
}

fn unexpected(status: StatusCode, response: &ResponseMeta) -> Error {
    Error::unexpected_status("GET", status.as_u16(), response.status_message.clone())
}

// ============================================================================
// Backoff Policy
// ============================================================================

/// Same verdicts as [`DefaultPolicy`], but every retry is deferred by a delay.
///
/// The delay honours a numeric `Retry-After` header and otherwise follows the
/// backoff curve, counted in consecutive retries since the last accepted
/// response of any request classified by this instance.
#[derive(Debug)]
pub struct BackoffPolicy {
    backoff_type: BackoffType,
    initial: Duration,
    max: Duration,
    retry_server_errors: bool,
    consecutive: AtomicU32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(
            BackoffType::Exponential,
            Duration::from_millis(100),
            Duration::from_secs(60),
        )
    }
}

impl BackoffPolicy {
    /// Create a backoff policy
    pub fn new(backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        Self {
            backoff_type,
            initial,
            max,
            retry_server_errors: false,
            consecutive: AtomicU32::new(0),
        }
    }

    /// Also retry 500, 502, 503 and 504
    #[must_use]
    pub fn retry_server_errors(mut self) -> Self {
        self.retry_server_errors = true;
        self
    }

    /// Calculate backoff delay for a given attempt
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let delay = match self.backoff_type {
            BackoffType::Constant => self.initial,
            BackoffType::Linear => self.initial.saturating_mul(attempt.saturating_add(1)),
            BackoffType::Exponential => self.initial.saturating_mul(2u32.saturating_pow(attempt)),
        };

        std::cmp::min(delay, self.max)
    }

    fn is_retryable(&self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS
            || (self.retry_server_errors && matches!(status.as_u16(), 500 | 502 | 503 | 504))
    }
}

impl ResponsePolicy for BackoffPolicy {
    fn classify(&self, response: &ResponseMeta, request: &RequestDescriptor) -> Result<Verdict> {
        let status = response.status;

        if !self.is_retryable(status) {
            let verdict = DefaultPolicy.classify(response, request)?;
            self.consecutive.store(0, Ordering::Relaxed);
            return Ok(verdict);
        }

        let attempt = self.consecutive.fetch_add(1, Ordering::Relaxed);
        let delay = retry_after(response)
            .map_or_else(|| self.calculate_backoff(attempt), |d| d.min(self.max));

        warn!(
            "GET {} returned {}, retrying in {:?}",
            request.url,
            status.as_u16(),
            delay
        );

        Ok(Verdict::Defer(
            async move {
                tokio::time::sleep(delay).await;
                Ok(false)
            }
            .boxed(),
        ))
    }
}

/// Extract a `Retry-After` delay given in seconds
fn retry_after(response: &ResponseMeta) -> Option<Duration> {
    response
        .header("retry-after")
        .and_then(|s| s.trim().parse().ok())
        .map(Duration::from_secs)
}
