//! Paginated streamer
//!
//! Runs one [`PageDriver`] per page. When a page completes, the continuation
//! gets a copy of the page's request together with the page result and
//! decides whether, and how, the next page is requested. The next page never
//! starts before that decision resolves.

use super::lifecycle::{FetchContext, PageDriver, PageEvent};
use crate::config::StreamOptions;
use crate::error::{Error, Result};
use crate::http::Transport;
use crate::pagination::Continuation;
use crate::transform::TransformFactory;
use crate::types::{Chunk, RequestDescriptor, StreamState};
use futures::future::BoxFuture;
use futures::stream::{FusedStream, Stream};
use futures::FutureExt;
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// Result of asking the continuation about the next page
struct Decision {
    continuation: Box<dyn Continuation>,
    page: RequestDescriptor,
    outcome: Result<bool>,
}

enum State {
    Active(PageDriver),
    Completing(BoxFuture<'static, Decision>),
    Failed(Option<Error>),
    Terminal,
}

/// Streams a paginated resource as one continuous sequence of chunks
///
/// ```rust,ignore
/// use streamfetch::{paginate, StreamOptions, CursorContinuation, DecoderConfig};
///
/// let options = StreamOptions::default()
///     .transform(DecoderConfig::json_with_path("data").factory().unwrap());
/// let records = paginate(
///     "https://api.example.com/v1/customers",
///     CursorContinuation::new("starting_after", "$.data[-1].id"),
///     options,
/// )?;
/// ```
pub struct PaginatedStreamer {
    ctx: Arc<FetchContext>,
    transform: Option<TransformFactory>,
    continuation: Option<Box<dyn Continuation>>,
    request: RequestDescriptor,
    state: State,
    started: bool,
    pages: usize,
}

impl PaginatedStreamer {
    /// Create a streamer starting at `url`; the first request is sent on first poll
    pub fn new(
        transport: Arc<dyn Transport>,
        url: &str,
        continuation: impl Continuation + 'static,
        options: StreamOptions,
    ) -> Result<Self> {
        let request = options.request(url)?;
        Ok(Self::from_request(
            transport,
            request,
            Box::new(continuation),
            options,
        ))
    }

    /// Create a streamer starting at a prepared request
    pub fn from_request(
        transport: Arc<dyn Transport>,
        mut request: RequestDescriptor,
        continuation: Box<dyn Continuation>,
        options: StreamOptions,
    ) -> Self {
        options.apply(&mut request);
        let ctx = options.context(transport);
        let transform = options.transform;
        let driver = PageDriver::new(
            Arc::clone(&ctx),
            request.clone(),
            transform.as_ref().map(|make| make()),
            1,
        );

        Self {
            ctx,
            transform,
            continuation: Some(continuation),
            request,
            state: State::Active(driver),
            started: false,
            pages: 1,
        }
    }

    /// Request of the current page
    pub fn request(&self) -> &RequestDescriptor {
        &self.request
    }

    /// Number of pages started so far
    pub fn page_count(&self) -> usize {
        self.pages
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        match &self.state {
            State::Active(_) if !self.started => StreamState::Idle,
            State::Active(driver) => driver.state(),
            State::Completing(_) => StreamState::Completing,
            State::Failed(_) => StreamState::Failed,
            State::Terminal => StreamState::Terminal,
        }
    }

    /// Cancel the stream.
    ///
    /// Aborts the current page, or abandons a pending continuation decision
    /// before it is acted upon. With a reason, the next poll yields it as an
    /// error; the stream ends after that.
    pub fn destroy(&mut self, reason: Option<Error>) {
        match &mut self.state {
            State::Active(driver) => driver.detach(),
            State::Completing(_) => {}
            State::Failed(_) | State::Terminal => return,
        }

        debug!(
            "Destroying paginated stream on page {}: GET {}",
            self.pages, self.request.url
        );
        self.state = match reason {
            Some(reason) => State::Failed(Some(reason)),
            None => State::Terminal,
        };
    }

    /// Hand the finished page to the continuation
    fn complete(&mut self, data: Option<Value>) -> State {
        let Some(mut continuation) = self.continuation.take() else {
            return State::Terminal;
        };

        debug!("Page {} complete, asking for the next page", self.pages);
        let mut page = self.request.clone();
        State::Completing(
            async move {
                let outcome = continuation.next_page(&mut page, data.as_ref()).await;
                Decision {
                    continuation,
                    page,
                    outcome,
                }
            }
            .boxed(),
        )
    }

    /// Act on the continuation's answer
    fn decide(&mut self, decision: Decision) -> State {
        self.continuation = Some(decision.continuation);

        match decision.outcome {
            Ok(true) => {
                self.pages += 1;
                self.request = decision.page;
                debug!("Starting page {}: GET {}", self.pages, self.request.url);

                let transform = self.transform.as_ref().map(|make| make());
                State::Active(PageDriver::new(
                    Arc::clone(&self.ctx),
                    self.request.clone(),
                    transform,
                    self.pages,
                ))
            }
            Ok(false) => {
                debug!("No more pages after page {}", self.pages);
                State::Terminal
            }
            Err(e) => {
                warn!(
                    "Pagination stopped after page {}: continuation failed: {e}",
                    self.pages
                );
                State::Terminal
            }
        }
    }
}

impl Stream for PaginatedStreamer {
    type Item = Result<Chunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match &mut this.state {
                State::Active(driver) => {
                    this.started = true;
                    match futures::ready!(driver.poll_event(cx)) {
                        PageEvent::Chunk(chunk) => return Poll::Ready(Some(Ok(chunk))),
                        PageEvent::Complete(data) => this.state = this.complete(data),
                        PageEvent::Failed(error) => {
                            this.state = State::Failed(None);
                            return Poll::Ready(Some(Err(error)));
                        }
                    }
                }
                State::Completing(decision) => {
                    let decision = futures::ready!(decision.poll_unpin(cx));
                    this.state = this.decide(decision);
                }
                State::Failed(reason) => return Poll::Ready(reason.take().map(Err)),
                State::Terminal => return Poll::Ready(None),
            }
        }
    }
}

impl FusedStream for PaginatedStreamer {
    fn is_terminated(&self) -> bool {
        matches!(self.state, State::Terminal | State::Failed(None))
    }
}
