//! Configuration types for streamers
//!
//! [`StreamOptions`] is the programmatic options structure shared by both
//! streamers. [`FetchConfig`] is its file-backed counterpart (YAML or JSON),
//! describing one fetch end to end: URL, transport settings, decoder and
//! pagination.

use crate::error::{Error, Result, ResultExt};
use crate::http::{RateLimiterConfig, Transport, TransportConfig};
use crate::pagination::{Continuation, PaginationConfig};
use crate::policy::{BackoffPolicy, DefaultPolicy, ResponsePolicy};
use crate::stream::lifecycle::FetchContext;
use crate::transform::{DecoderConfig, TransformFactory};
use crate::types::{BackoffType, RequestDescriptor, StringMap};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Stream Options
// ============================================================================

/// Options shared by [`SingleRequestStreamer`](crate::SingleRequestStreamer)
/// and [`PaginatedStreamer`](crate::PaginatedStreamer)
///
/// Every field has a default: no extra query or headers, the
/// [`DefaultPolicy`], raw bytes (no transform), degraded error handling and
/// unlimited retries.
#[derive(Clone, Default)]
pub struct StreamOptions {
    /// Query parameters merged into the first request
    pub query: StringMap,
    /// Headers sent with every request
    pub headers: StringMap,
    /// Response classification policy; [`DefaultPolicy`] when unset
    pub policy: Option<Arc<dyn ResponsePolicy>>,
    /// Builds the transform for each page; raw bytes when unset
    pub transform: Option<TransformFactory>,
    /// Surface transport and transform errors instead of ending the page
    pub abort_on_error: bool,
    /// Re-issues allowed per page before it fails
    pub max_retries: Option<u32>,
}

impl std::fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOptions")
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("policy", &self.policy.is_some())
            .field("transform", &self.transform.is_some())
            .field("abort_on_error", &self.abort_on_error)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl StreamOptions {
    /// Create default options
    pub fn new() -> Self {
        Self::default()
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

    /// Set the response policy
    #[must_use]
    pub fn policy(mut self, policy: impl ResponsePolicy + 'static) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Set the transform factory
    #[must_use]
    pub fn transform(mut self, factory: TransformFactory) -> Self {
        self.transform = Some(factory);
        self
    }

    /// Fail the stream on transport and transform errors
    #[must_use]
    pub fn abort_on_error(mut self, abort: bool) -> Self {
        self.abort_on_error = abort;
        self
    }

    /// Limit how often one page may be re-issued
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Build the first request for `url` with these options' query and headers
    pub fn request(&self, url: &str) -> Result<RequestDescriptor> {
        let mut request = RequestDescriptor::new(url)?;
        self.apply(&mut request);
        Ok(request)
    }

    /// Merge query and headers into an existing request; the request wins
    pub(crate) fn apply(&self, request: &mut RequestDescriptor) {
        for (key, value) in &self.query {
            request
                .query
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        for (key, value) in &self.headers {
            request
                .headers
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    pub(crate) fn context(&self, transport: Arc<dyn Transport>) -> Arc<FetchContext> {
        let policy = self
            .policy
            .clone()
            .unwrap_or_else(|| Arc::new(DefaultPolicy));

        Arc::new(FetchContext {
            transport,
            policy,
            abort_on_error: self.abort_on_error,
            max_retries: self.max_retries,
        })
    }
}

// ============================================================================
// Fetch Config
// ============================================================================

/// Complete fetch description loaded from YAML or JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Resource URL; may be supplied separately (e.g. on the command line)
    #[serde(default)]
    pub url: Option<String>,

    /// Query parameters for the first request
    #[serde(default)]
    pub query: StringMap,

    /// Headers for every request
    #[serde(default)]
    pub headers: StringMap,

    /// Fail on transport and transform errors
    #[serde(default)]
    pub abort_on_error: bool,

    /// Re-issues allowed per page
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Delay retries instead of re-issuing immediately
    #[serde(default)]
    pub backoff: Option<BackoffConfig>,

    /// HTTP transport settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Body decoder
    #[serde(default)]
    pub decoder: DecoderConfig,

    /// Pagination strategy
    #[serde(default)]
    pub pagination: PaginationConfig,
}

impl FetchConfig {
    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load from a file; `.json` files are parsed as JSON, anything else as YAML
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        };
        config.with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Build the first request, including the pagination's first-page parameters
    pub fn request(&self) -> Result<RequestDescriptor> {
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| Error::config("No URL given"))?;

        let mut request = RequestDescriptor::new(url)?;
        request.query.extend(self.query.clone());
        request.headers.extend(self.headers.clone());
        Ok(self.pagination.prepare(request))
    }

    /// Transport settings
    pub fn transport_config(&self) -> TransportConfig {
        self.http.to_transport_config()
    }

    /// Streamer options (query and headers travel in [`Self::request`])
    pub fn stream_options(&self) -> StreamOptions {
        let mut options = StreamOptions::new().abort_on_error(self.abort_on_error);
        options.max_retries = self.max_retries;
        options.transform = self.decoder.factory();
        if let Some(backoff) = &self.backoff {
            options.policy = Some(Arc::new(backoff.to_policy()));
        }
        options
    }

    /// Continuation for the configured pagination, `None` for a single request
    pub fn continuation(&self) -> Option<Box<dyn Continuation>> {
        self.pagination.continuation()
    }
}

// ============================================================================
// HTTP Config
// ============================================================================

/// HTTP transport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connect and response head timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Idle timeout between body chunks in seconds
    #[serde(default = "default_timeout")]
    pub read_timeout_seconds: u64,

    /// Transparently decompress gzip bodies
    #[serde(default = "default_gzip")]
    pub gzip: bool,

    /// User agent, `streamfetch/<version>` when unset
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Default headers for every request
    #[serde(default)]
    pub headers: StringMap,

    /// Client-side rate limit; `null` disables it
    #[serde(default = "default_rate_limit")]
    pub rate_limit: Option<RateLimiterConfig>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            read_timeout_seconds: default_timeout(),
            gzip: default_gzip(),
            user_agent: None,
            headers: StringMap::new(),
            rate_limit: default_rate_limit(),
        }
    }
}

impl HttpConfig {
    /// Convert into a [`TransportConfig`]
    pub fn to_transport_config(&self) -> TransportConfig {
        let mut builder = TransportConfig::builder()
            .timeout(Duration::from_secs(self.timeout_seconds))
            .read_timeout(Duration::from_secs(self.read_timeout_seconds))
            .gzip(self.gzip);

        builder = match &self.rate_limit {
            Some(limit) => builder.rate_limit(limit.clone()),
            None => builder.no_rate_limit(),
        };
        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent);
        }
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }

        builder.build()
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_gzip() -> bool {
    true
}

#[allow(clippy::unnecessary_wraps)]
fn default_rate_limit() -> Option<RateLimiterConfig> {
    Some(RateLimiterConfig::default())
}

// ============================================================================
// Backoff Config
// ============================================================================

/// Retry backoff configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Type of backoff
    #[serde(rename = "type", default)]
    pub backoff_type: BackoffType,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,

    /// Also retry 500, 502, 503 and 504
    #[serde(default)]
    pub retry_server_errors: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            backoff_type: BackoffType::Exponential,
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
            retry_server_errors: false,
        }
    }
}

impl BackoffConfig {
    /// Build the matching [`BackoffPolicy`]
    pub fn to_policy(&self) -> BackoffPolicy {
        let policy = BackoffPolicy::new(
            self.backoff_type,
            Duration::from_millis(self.initial_ms),
            Duration::from_millis(self.max_ms),
        );
        if self.retry_server_errors {
            policy.retry_server_errors()
        } else {
            policy
        }
    }
}

fn default_initial_ms() -> u64 {
    100
}

fn default_max_ms() -> u64 {
    60000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::DecoderFormat;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_stream_options_defaults() {
        let options = StreamOptions::default();
        assert!(options.query.is_empty());
        assert!(options.policy.is_none());
        assert!(options.transform.is_none());
        assert!(!options.abort_on_error);
        assert_eq!(options.max_retries, None);
    }

    #[test]
    fn test_stream_options_request() {
        let options = StreamOptions::new()
            .query("limit", "10")
            .header("Accept", "application/json");

        let request = options.request("https://api.example.com/items").unwrap();
        assert_eq!(request.query.get("limit"), Some(&"10".to_string()));
        assert_eq!(
            request.headers.get("Accept"),
            Some(&"application/json".to_string())
        );
    }

    #[test]
    fn test_stream_options_invalid_url() {
        let err = StreamOptions::new().request("not a url").unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }

    #[test]
    fn test_fetch_config_yaml() {
        let config = FetchConfig::from_yaml_str(
            r"
url: https://api.example.com/v1/customers
query:
  limit: '100'
headers:
  Accept: application/json
abort_on_error: true
max_retries: 3
backoff:
  type: constant
  initial_ms: 250
http:
  timeout_seconds: 5
  read_timeout_seconds: 120
  rate_limit: null
decoder:
  format: json
  record_path: $.data
pagination:
  type: cursor
  cursor_param: starting_after
  cursor_path: $.data[-1].id
",
        )
        .unwrap();

        assert!(config.abort_on_error);
        assert_eq!(config.max_retries, Some(3));
        assert_eq!(config.decoder.format, DecoderFormat::Json);
        assert!(config.pagination.is_paginated());

        let backoff = config.backoff.clone().unwrap();
        assert_eq!(backoff.backoff_type, BackoffType::Constant);
        assert_eq!(backoff.max_ms, 60000);

        let transport = config.transport_config();
        assert_eq!(transport.timeout, Duration::from_secs(5));
        assert_eq!(transport.read_timeout, Duration::from_secs(120));
        assert!(transport.rate_limit.is_none());
        assert!(transport.gzip);

        let request = config.request().unwrap();
        assert_eq!(request.query.get("limit"), Some(&"100".to_string()));

        let options = config.stream_options();
        assert!(options.abort_on_error);
        assert!(options.transform.is_some());
        assert!(options.policy.is_some());
        assert!(config.continuation().is_some());
    }

    #[test]
    fn test_fetch_config_defaults() {
        let config = FetchConfig::from_json_str(r#"{"url": "https://example.com/feed"}"#).unwrap();

        assert_eq!(config.http, HttpConfig::default());
        assert_eq!(
            config.transport_config().rate_limit,
            Some(RateLimiterConfig::default())
        );
        assert!(config.stream_options().transform.is_none());
        assert!(config.stream_options().policy.is_none());
        assert!(config.continuation().is_none());
    }

    #[test]
    fn test_fetch_config_without_url() {
        let config = FetchConfig::default();
        let err = config.request().unwrap_err();
        assert!(err.to_string().contains("No URL"));
    }

    #[test]
    fn test_fetch_config_page_number_prepares_first_page() {
        let config = FetchConfig::from_yaml_str(
            r"
url: https://example.com/items
pagination:
  type: page_number
  page_param: page
  start_page: 0
",
        )
        .unwrap();

        let request = config.request().unwrap();
        assert_eq!(request.query.get("page"), Some(&"0".to_string()));
    }

    #[test]
    fn test_fetch_config_from_path() {
        let mut yaml = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(yaml, "url: https://example.com/a\ndecoder:\n  format: jsonl").unwrap();
        let config = FetchConfig::from_path(yaml.path()).unwrap();
        assert_eq!(config.decoder.format, DecoderFormat::Jsonl);

        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(json, r#"{{"url": "https://example.com/b", "max_retries": 2}}"#).unwrap();
        let config = FetchConfig::from_path(json.path()).unwrap();
        assert_eq!(config.max_retries, Some(2));
    }

    #[test]
    fn test_fetch_config_missing_file() {
        let err = FetchConfig::from_path("/nonexistent/fetch.yaml").unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Failed to read config /nonexistent/fetch.yaml: IO error:"));
    }

    #[test]
    fn test_fetch_config_invalid_file_names_path() {
        let mut yaml = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(yaml, "max_retries: [not, a, number]").unwrap();

        let err = FetchConfig::from_path(yaml.path()).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with(&format!("Invalid config {}", yaml.path().display())));
        assert!(message.contains("Failed to parse YAML"));
    }
}
