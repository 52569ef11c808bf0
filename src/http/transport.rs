//! Transport abstraction and the reqwest-backed implementation
//!
//! A transport issues exactly one GET per call and hands back the response
//! metadata together with a lazily polled body stream. It never retries on its
//! own; retry decisions belong to the response policy.

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::error::{Error, Result};
use crate::types::{RequestDescriptor, StringMap};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode, Version};
use std::time::Duration;
use tracing::debug;

/// Body of a response, pulled chunk by chunk
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// Status line and headers of a response
#[derive(Debug, Clone)]
pub struct ResponseMeta {
    /// Status code
    pub status: StatusCode,
    /// Canonical reason phrase for the status, empty if unknown
    pub status_message: String,
    /// Response headers
    pub headers: HeaderMap,
    /// HTTP version
    pub version: Version,
}

impl ResponseMeta {
    /// Create metadata for a status with no headers
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            status_message: status.canonical_reason().unwrap_or_default().to_string(),
            headers: HeaderMap::new(),
            version: Version::HTTP_11,
        }
    }

    /// Read a header as a string
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A response whose body has not been consumed yet
pub struct TransportResponse {
    /// Status line and headers
    pub meta: ResponseMeta,
    /// Body stream; dropping it aborts the underlying request
    pub body: BodyStream,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// Issues GET requests on behalf of the streamers
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one GET for the descriptor and return once the response head arrives
    async fn get(&self, request: &RequestDescriptor) -> Result<TransportResponse>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the reqwest transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Deadline for connecting and receiving the response head
    pub timeout: Duration,
    /// Longest wait for the next body chunk while the consumer is pulling
    pub read_timeout: Duration,
    /// Transparently decompress gzip bodies
    pub gzip: bool,
    /// Rate limiter configuration
    pub rate_limit: Option<RateLimiterConfig>,
    /// Default headers for all requests
    pub default_headers: StringMap,
    /// User agent string
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            gzip: true,
            rate_limit: Some(RateLimiterConfig::default()),
            default_headers: StringMap::new(),
            user_agent: format!("streamfetch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportConfig {
    /// Create a new config builder
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::default()
    }
}

/// Builder for transport config
#[derive(Default)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Set the response head timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the idle timeout between body chunks
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Enable or disable gzip decompression
    pub fn gzip(mut self, enabled: bool) -> Self {
        self.config.gzip = enabled;
        self
    }

    /// Set rate limiter
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Disable rate limiting
    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the config
    pub fn build(self) -> TransportConfig {
        self.config
    }
}

// ============================================================================
// Reqwest Transport
// ============================================================================

/// Transport backed by a shared reqwest client
pub struct ReqwestTransport {
    client: Client,
    config: TransportConfig,
    rate_limiter: Option<RateLimiter>,
}

impl ReqwestTransport {
    /// Create a transport with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(TransportConfig::default())
    }

    /// Create a transport with custom configuration
    pub fn with_config(config: TransportConfig) -> Result<Self> {
        // No total deadline: the body is read at the consumer's pace
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .gzip(config.gzip)
            .user_agent(&config.user_agent)
            .build()?;

        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Check if rate limiting is enabled
    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: &RequestDescriptor) -> Result<TransportResponse> {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }

        let mut req = self.client.get(request.url.clone());

        for (key, value) in &self.config.default_headers {
            req = req.header(key.as_str(), value.as_str());
        }

        // Request headers win over defaults
        for (key, value) in &request.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        if !request.query.is_empty() {
            req = req.query(&request.query);
        }

        let response = tokio::time::timeout(self.config.timeout, req.send())
            .await
            .map_err(|_| timeout_error(self.config.timeout))?
            .map_err(|e| http_error(e, self.config.timeout))?;

        let status = response.status();
        debug!("GET {} -> {}", request.url, status.as_u16());

        let meta = ResponseMeta {
            status,
            status_message: status.canonical_reason().unwrap_or_default().to_string(),
            headers: response.headers().clone(),
            version: response.version(),
        };
        let body = idle_timeout_body(response.bytes_stream(), self.config.read_timeout);

        Ok(TransportResponse { meta, body })
    }
}

/// Wrap a body so each pull fails with [`Error::Timeout`] after `idle` without data.
///
/// The clock only runs while a pull is pending, so a slow consumer never
/// trips it.
fn idle_timeout_body<S>(body: S, idle: Duration) -> BodyStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    stream::unfold(Some(body.boxed()), move |body| async move {
        let mut body = body?;
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(body))),
            Ok(Some(Err(e))) => Some((Err(http_error(e, idle)), None)),
            Ok(None) => None,
            Err(_) => Some((Err(timeout_error(idle)), None)),
        }
    })
    .boxed()
}

fn timeout_error(limit: Duration) -> Error {
    Error::Timeout {
        timeout_ms: limit.as_millis() as u64,
    }
}

fn http_error(e: reqwest::Error, limit: Duration) -> Error {
    if e.is_timeout() {
        timeout_error(limit)
    } else {
        Error::Http(e)
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("config", &self.config)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}
