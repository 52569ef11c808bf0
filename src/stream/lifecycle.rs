//! Per-page request lifecycle shared by both streamers
//!
//! A [`PageDriver`] owns everything that lives for exactly one page: the
//! request snapshot, the in-flight transport response and the transform. It
//! turns them into a sequence of [`PageEvent`]s and tears them down exactly
//! once, whichever way the page ends.

use crate::error::{Error, Result};
use crate::http::{BodyStream, Transport, TransportResponse};
use crate::policy::{ResponsePolicy, Verdict};
use crate::transform::Transform;
use crate::types::{Chunk, RequestDescriptor, StreamState};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{ready, FutureExt, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, trace, warn};

/// Collaborators and flags shared by every page of one streamer
pub(crate) struct FetchContext {
    pub transport: Arc<dyn Transport>,
    pub policy: Arc<dyn ResponsePolicy>,
    pub abort_on_error: bool,
    pub max_retries: Option<u32>,
}

/// What a page reports to its owner
pub(crate) enum PageEvent {
    /// Next output chunk
    Chunk(Chunk),
    /// The page is over; carries the transform's page result
    Complete(Option<Value>),
    /// Fatal error; the page has already been torn down
    Failed(Error),
}

enum Phase {
    Idle,
    Requesting(BoxFuture<'static, Result<TransportResponse>>),
    Deferred(BoxFuture<'static, Result<bool>>),
    Streaming(BodyStream),
    Draining(Option<Value>),
    Done,
}

pub(crate) struct PageDriver {
    ctx: Arc<FetchContext>,
    request: RequestDescriptor,
    transform: Option<Box<dyn Transform>>,
    phase: Phase,
    page: usize,
    retries: u32,
    pending: VecDeque<Chunk>,
    scratch: Vec<Chunk>,
    detached: bool,
}

impl PageDriver {
    pub fn new(
        ctx: Arc<FetchContext>,
        request: RequestDescriptor,
        transform: Option<Box<dyn Transform>>,
        page: usize,
    ) -> Self {
        Self {
            ctx,
            request,
            transform,
            phase: Phase::Idle,
            page,
            retries: 0,
            pending: VecDeque::new(),
            scratch: Vec::new(),
            detached: false,
        }
    }

    /// Replace the transform; only meaningful before the page starts
    pub fn set_transform(&mut self, transform: Box<dyn Transform>) {
        self.transform = Some(transform);
    }

    pub fn state(&self) -> StreamState {
        match self.phase {
            Phase::Idle | Phase::Requesting(_) => StreamState::Requesting,
            Phase::Deferred(_) => StreamState::Retrying,
            Phase::Streaming(_) | Phase::Draining(_) => StreamState::Streaming,
            Phase::Done => StreamState::Terminal,
        }
    }

    /// Drive the page until it has something to report.
    ///
    /// The body is only polled when no produced chunk is waiting, so a slow
    /// consumer holds back the network.
    pub fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<PageEvent> {
        loop {
            if let Some(chunk) = self.pending.pop_front() {
                return Poll::Ready(PageEvent::Chunk(chunk));
            }

            let event = match &mut self.phase {
                Phase::Idle => {
                    self.send();
                    None
                }
                Phase::Requesting(request) => match ready!(request.poll_unpin(cx)) {
                    Ok(response) => self.classify(response),
                    Err(e) => self.fail(e),
                },
                Phase::Deferred(wait) => match ready!(wait.poll_unpin(cx)) {
                    Ok(false) => self.retry(),
                    Ok(true) => {
                        self.detach();
                        Some(PageEvent::Failed(Error::protocol_violation(
                            "deferred classification resolved to accept",
                        )))
                    }
                    Err(e) => {
                        self.detach();
                        Some(PageEvent::Failed(e))
                    }
                },
                Phase::Streaming(body) => match ready!(body.poll_next_unpin(cx)) {
                    Some(Ok(bytes)) => self.forward(bytes),
                    Some(Err(e)) => self.fail(e),
                    None => self.end_of_input(),
                },
                Phase::Draining(result) => {
                    let result = result.take();
                    debug!("Page {} complete: GET {}", self.page, self.request.url);
                    self.detach();
                    Some(PageEvent::Complete(result))
                }
                Phase::Done => Some(PageEvent::Complete(None)),
            };

            if let Some(event) = event {
                return Poll::Ready(event);
            }
        }
    }

    fn send(&mut self) {
        debug!(
            "Requesting page {} (attempt {}): GET {}",
            self.page,
            self.retries + 1,
            self.request.url
        );
        let transport = Arc::clone(&self.ctx.transport);
        let request = self.request.clone();
        self.phase = Phase::Requesting(async move { transport.get(&request).await }.boxed());
    }

    fn classify(&mut self, response: TransportResponse) -> Option<PageEvent> {
        let verdict = self.ctx.policy.classify(&response.meta, &self.request);
        let status = response.meta.status.as_u16();

        match verdict {
            Ok(Verdict::Accept) => {
                debug!("Page {} accepted with status {status}", self.page);
                self.phase = Phase::Streaming(response.body);
                None
            }
            Ok(Verdict::Retry) => {
                drop(response);
                self.retry()
            }
            Ok(Verdict::Defer(wait)) => {
                drop(response);
                trace!("Page {} deferred on status {status}", self.page);
                self.phase = Phase::Deferred(wait);
                None
            }
            Err(e) => {
                drop(response);
                self.detach();
                Some(PageEvent::Failed(e))
            }
        }
    }

    /// Re-issue the identical request; the previous response is already gone
    fn retry(&mut self) -> Option<PageEvent> {
        self.retries += 1;
        if let Some(max_retries) = self.ctx.max_retries {
            if self.retries > max_retries {
                return self.fail(Error::MaxRetriesExceeded { max_retries });
            }
        }

        warn!(
            "Retrying page {} (retry {}): GET {}",
            self.page, self.retries, self.request.url
        );
        self.phase = Phase::Idle;
        None
    }

    fn forward(&mut self, bytes: Bytes) -> Option<PageEvent> {
        let Some(transform) = self.transform.as_mut() else {
            self.pending.push_back(Chunk::Bytes(bytes));
            return None;
        };

        let pushed = transform.push(bytes, &mut self.scratch);
        self.pending.extend(self.scratch.drain(..));

        match pushed {
            Ok(()) => None,
            Err(e) => {
                self.transform = None;
                self.fail(e)
            }
        }
    }

    /// The body is exhausted (or abandoned): let the transform finish the page
    fn end_of_input(&mut self) -> Option<PageEvent> {
        let Some(transform) = self.transform.as_mut() else {
            self.phase = Phase::Draining(None);
            return None;
        };

        let finished = transform.finish(&mut self.scratch);
        self.pending.extend(self.scratch.drain(..));

        match finished {
            Ok(result) => {
                self.phase = Phase::Draining(result);
                None
            }
            Err(e) => {
                self.transform = None;
                self.fail(e)
            }
        }
    }

    /// Fatal when `abort_on_error` is set, otherwise the page ends early
    fn fail(&mut self, error: Error) -> Option<PageEvent> {
        if self.ctx.abort_on_error || error.is_fatal_regardless() {
            self.detach();
            return Some(PageEvent::Failed(error));
        }

        warn!(
            "Page {} failed, ending it early: GET {}: {error}",
            self.page, self.request.url
        );
        // Drops any in-flight response before the transform sees end of input
        self.phase = Phase::Done;
        self.end_of_input()
    }

    /// Release the response and the transform. Runs at most once per page.
    pub fn detach(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;

        trace!("Detaching page {}: GET {}", self.page, self.request.url);
        self.phase = Phase::Done;
        self.transform = None;
        self.pending.clear();
        self.scratch.clear();
    }
}

impl Drop for PageDriver {
    fn drop(&mut self) {
        self.detach();
    }
}
