//! Single request streamer

use super::lifecycle::{PageDriver, PageEvent};
use crate::config::StreamOptions;
use crate::error::{Error, Result};
use crate::http::Transport;
use crate::transform::Transform;
use crate::types::{Chunk, RequestDescriptor, StreamState};
use futures::stream::{FusedStream, Stream};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::debug;

enum State {
    Active(PageDriver),
    Failed(Option<Error>),
    Terminal,
}

/// Streams the body of one GET request
///
/// ```rust,ignore
/// use futures::StreamExt;
/// use streamfetch::{stream, StreamOptions};
///
/// let mut body = stream("https://example.com/feed", StreamOptions::default())?;
/// while let Some(chunk) = body.next().await {
///     let chunk = chunk?;
///     // ...
/// }
/// ```
pub struct SingleRequestStreamer {
    request: RequestDescriptor,
    state: State,
    started: bool,
}

impl SingleRequestStreamer {
    /// Create a streamer for `url`; the request is sent on first poll
    pub fn new(transport: Arc<dyn Transport>, url: &str, options: StreamOptions) -> Result<Self> {
        let request = options.request(url)?;
        Ok(Self::from_request(transport, request, options))
    }

    /// Create a streamer for a prepared request
    pub fn from_request(
        transport: Arc<dyn Transport>,
        mut request: RequestDescriptor,
        options: StreamOptions,
    ) -> Self {
        options.apply(&mut request);
        let ctx = options.context(transport);
        let transform = options.transform.as_ref().map(|make| make());
        let driver = PageDriver::new(ctx, request.clone(), transform, 1);

        Self {
            request,
            state: State::Active(driver),
            started: false,
        }
    }

    /// Use a pre-built transform instead of the options' factory
    #[must_use]
    pub fn with_transform(mut self, transform: Box<dyn Transform>) -> Self {
        if let State::Active(driver) = &mut self.state {
            driver.set_transform(transform);
        }
        self
    }

    /// The request this streamer sends
    pub fn request(&self) -> &RequestDescriptor {
        &self.request
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        match &self.state {
            State::Active(_) if !self.started => StreamState::Idle,
            State::Active(driver) => driver.state(),
            State::Failed(_) => StreamState::Failed,
            State::Terminal => StreamState::Terminal,
        }
    }

    /// Cancel the stream.
    ///
    /// Aborts the in-flight request and drops the transform. With a reason,
    /// the next poll yields it as an error; after that (or right away without
    /// a reason) the stream ends. Calling it on a finished stream does nothing.
    pub fn destroy(&mut self, reason: Option<Error>) {
        let State::Active(driver) = &mut self.state else {
            return;
        };

        debug!("Destroying stream: GET {}", self.request.url);
        driver.detach();
        self.state = match reason {
            Some(reason) => State::Failed(Some(reason)),
            None => State::Terminal,
        };
    }
}

impl Stream for SingleRequestStreamer {
    type Item = Result<Chunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match &mut this.state {
            State::Active(driver) => {
                this.started = true;
                match futures::ready!(driver.poll_event(cx)) {
                    PageEvent::Chunk(chunk) => Poll::Ready(Some(Ok(chunk))),
                    PageEvent::Complete(_) => {
                        this.state = State::Terminal;
                        Poll::Ready(None)
                    }
                    PageEvent::Failed(error) => {
                        this.state = State::Failed(None);
                        Poll::Ready(Some(Err(error)))
                    }
                }
            }
            State::Failed(reason) => Poll::Ready(reason.take().map(Err)),
            State::Terminal => Poll::Ready(None),
        }
    }
}

impl FusedStream for SingleRequestStreamer {
    fn is_terminated(&self) -> bool {
        matches!(self.state, State::Terminal | State::Failed(None))
    }
}
