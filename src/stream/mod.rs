//! Streamers
//!
//! Pull-based streams over one or more GET requests.
//!
//! - [`SingleRequestStreamer`] - one request, its body as a stream of chunks
//! - [`PaginatedStreamer`] - chains requests page by page through a
//!   [`Continuation`](crate::pagination::Continuation)
//!
//! Both implement [`futures::Stream`] with `Item = Result<Chunk>`. Nothing is
//! requested before the first poll, an error is yielded at most once and is
//! always followed by the end of the stream.

pub(crate) mod lifecycle;
mod paginated;
mod single;

pub use paginated::PaginatedStreamer;
pub use single::SingleRequestStreamer;

#[cfg(test)]
mod tests;
