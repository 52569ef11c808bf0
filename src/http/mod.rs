//! HTTP transport module
//!
//! Provides the network collaborator the streamers pull bodies from.
//!
//! # Features
//!
//! - **Transport Trait**: `get(request) -> status + headers + body stream`
//! - **Reqwest Transport**: gzip-enabled default implementation
//! - **Rate Limiting**: Token bucket rate limiter using governor, applied per request
//!   (retries included)

mod rate_limit;
mod transport;

pub use rate_limit::{RateLimiter, RateLimiterConfig};
pub use transport::{
    BodyStream, ReqwestTransport, ResponseMeta, Transport, TransportConfig,
    TransportConfigBuilder, TransportResponse,
};
