//! Error types for streamfetch
//!
//! This module defines the error hierarchy for the entire crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.

use thiserror::Error;

/// The main error type for streamfetch
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    /// Invalid or incomplete configuration
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong
        message: String,
    },

    /// URL failed to parse or join
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Malformed YAML config
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// Malformed JSON config or output
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Transport Errors
    // ============================================================================
    /// Error from the reqwest client
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Network failure reported by a custom transport
    #[error("Transport error: {message}")]
    Transport {
        /// Failure description
        message: String,
    },

    /// Response head or a body pull took too long
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// The limit that expired
        timeout_ms: u64,
    },

    // ============================================================================
    // Response Errors
    // ============================================================================
    /// Status the response policy does not handle
    #[error("{method} request failed with status {status} {reason}")]
    UnexpectedStatus {
        /// HTTP method, always `GET` today
        method: String,
        /// Status code
        status: u16,
        /// Reason phrase
        reason: String,
    },

    /// Retry budget used up
    #[error("Max retries ({max_retries}) exceeded")]
    MaxRetriesExceeded {
        /// Configured budget
        max_retries: u32,
    },

    /// Policy accepted a response it had deferred
    #[error("Response policy violated the retry protocol: {message}")]
    ProtocolViolation {
        /// What the policy did
        message: String,
    },

    // ============================================================================
    // Processing Errors
    // ============================================================================
    /// Transform rejected the body
    #[error("Transform failed: {message}")]
    Transform {
        /// Failure description
        message: String,
    },

    /// Continuation could not compute the next page
    #[error("Pagination continuation failed: {message}")]
    Continuation {
        /// Failure description
        message: String,
    },

    /// Stream destroyed with a reason
    #[error("Stream cancelled: {reason}")]
    Cancelled {
        /// Reason given to `destroy`
        reason: String,
    },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    /// File or stdout I/O
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    /// Error with added context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an unexpected status error for the given method
    pub fn unexpected_status(
        method: impl Into<String>,
        status: u16,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnexpectedStatus {
            method: method.into(),
            status,
            reason: reason.into(),
        }
    }

    /// Create a protocol violation error
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Create a transform error
    pub fn transform(message: impl Into<String>) -> Self {
        Self::Transform {
            message: message.into(),
        }
    }

    /// Create a continuation error
    pub fn continuation(message: impl Into<String>) -> Self {
        Self::Continuation {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Check if this error came from the network layer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Transport { .. } | Error::Timeout { .. }
        )
    }

    /// Check if this error ends a stream even when `abort_on_error` is off
    pub fn is_fatal_regardless(&self) -> bool {
        matches!(
            self,
            Error::ProtocolViolation { .. }
                | Error::UnexpectedStatus { .. }
                | Error::Cancelled { .. }
        )
    }
}

/// Result type alias for streamfetch
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
