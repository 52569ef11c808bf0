//! Tests for stream module
//!
//! Driven by a scripted in-memory transport so every lifecycle edge can be
//! reached deterministically.

use super::*;
use crate::config::StreamOptions;
use crate::error::{Error, Result};
use crate::http::{ResponseMeta, Transport, TransportResponse};
use crate::pagination::Continuation;
use crate::policy::Verdict;
use crate::transform::{factory, DecoderConfig, JsonLinesTransform, LinesTransform};
use crate::types::{Chunk, RequestDescriptor, StreamState};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, FutureExt, StreamExt};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Scripted Transport
// ============================================================================

enum Step {
    /// Respond with a status and a finite body
    Respond(u16, Vec<Result<Bytes>>),
    /// Respond with a body that never ends after its chunks
    Hang(u16, Vec<&'static str>),
    /// Fail before any response arrives
    Refuse,
}

fn respond(status: u16, chunks: &[&'static str]) -> Step {
    Step::Respond(
        status,
        chunks.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect(),
    )
}

fn broken_body(chunks: &[&'static str]) -> Step {
    let mut body: Vec<Result<Bytes>> = chunks
        .iter()
        .map(|c| Ok(Bytes::from_static(c.as_bytes())))
        .collect();
    body.push(Err(Error::transport("connection reset")));
    Step::Respond(200, body)
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<RequestDescriptor>>,
    bodies_dropped: Arc<AtomicUsize>,
    chunks_pulled: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<RequestDescriptor> {
        self.requests.lock().unwrap().clone()
    }

    fn bodies_dropped(&self) -> usize {
        self.bodies_dropped.load(Ordering::SeqCst)
    }

    fn chunks_pulled(&self) -> usize {
        self.chunks_pulled.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, request: &RequestDescriptor) -> Result<TransportResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .expect("unscripted request");

        let (status, body) = match step {
            Step::Refuse => return Err(Error::transport("connection refused")),
            Step::Respond(status, chunks) => (status, stream::iter(chunks).boxed()),
            Step::Hang(status, chunks) => (
                status,
                stream::iter(chunks)
                    .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                    .chain(stream::pending())
                    .boxed(),
            ),
        };

        let guard = DropCounter(Arc::clone(&self.bodies_dropped));
        let pulled = Arc::clone(&self.chunks_pulled);
        Ok(TransportResponse {
            meta: ResponseMeta::new(StatusCode::from_u16(status).unwrap()),
            body: body
                .map(move |chunk| {
                    let _alive = &guard;
                    pulled.fetch_add(1, Ordering::SeqCst);
                    chunk
                })
                .boxed(),
        })
    }
}

const URL: &str = "https://api.example.com/1";

fn single(transport: &Arc<ScriptedTransport>, options: StreamOptions) -> SingleRequestStreamer {
    SingleRequestStreamer::new(transport.clone(), URL, options).unwrap()
}

async fn collect_bytes<S>(stream: S) -> Result<String>
where
    S: futures::Stream<Item = Result<Chunk>> + Unpin,
{
    let chunks: Vec<Result<Chunk>> = stream.collect().await;
    let mut text = String::new();
    for chunk in chunks {
        let chunk = chunk?;
        text.push_str(std::str::from_utf8(chunk.as_bytes().unwrap()).unwrap());
    }
    Ok(text)
}

// ============================================================================
// Single Request Tests
// ============================================================================

#[tokio::test]
async fn test_lazy_start() {
    let transport = ScriptedTransport::new(vec![respond(200, &["body"])]);
    let mut streamer = single(&transport, StreamOptions::default());

    assert_eq!(streamer.state(), StreamState::Idle);
    assert_eq!(transport.calls(), 0);

    let chunk = streamer.next().await.unwrap().unwrap();
    assert_eq!(chunk.as_bytes().unwrap(), &Bytes::from_static(b"body"));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_body_chunks_in_order() {
    let transport = ScriptedTransport::new(vec![respond(200, &["he", "ll", "o"])]);
    let mut streamer = single(&transport, StreamOptions::default());

    assert_eq!(collect_bytes(&mut streamer).await.unwrap(), "hello");
    assert_eq!(streamer.state(), StreamState::Terminal);
    assert!(futures::stream::FusedStream::is_terminated(&streamer));
    assert!(streamer.next().await.is_none());
    assert_eq!(transport.bodies_dropped(), 1);
}

#[tokio::test]
async fn test_body_pulled_on_demand() {
    let transport = ScriptedTransport::new(vec![respond(200, &["a", "b", "c"])]);
    let mut streamer = single(&transport, StreamOptions::default());

    assert!(streamer.next().await.is_some());
    assert_eq!(transport.chunks_pulled(), 1);
    assert!(streamer.next().await.is_some());
    assert_eq!(transport.chunks_pulled(), 2);
}

#[tokio::test]
async fn test_transform_output_kept_until_pulled() {
    let transport = ScriptedTransport::new(vec![respond(200, &["1\n2\n3\n", "4\n"])]);
    let mut streamer = single(
        &transport,
        StreamOptions::new().transform(factory(LinesTransform::new)),
    );

    // One body chunk yields three lines; none are dropped while they wait
    for expected in ["1", "2", "3"] {
        let chunk = streamer.next().await.unwrap().unwrap();
        assert_eq!(chunk.as_bytes().unwrap().as_ref(), expected.as_bytes());
        assert_eq!(transport.chunks_pulled(), 1);
    }
    assert_eq!(collect_bytes(&mut streamer).await.unwrap(), "4");
}

#[tokio::test]
async fn test_not_found_is_empty() {
    let transport = ScriptedTransport::new(vec![respond(404, &[""])]);
    let streamer = single(&transport, StreamOptions::default());

    assert_eq!(collect_bytes(streamer).await.unwrap(), "");
}

#[tokio::test]
async fn test_too_many_requests_retries_same_request() {
    let transport = ScriptedTransport::new(vec![respond(429, &["slow down"]), respond(200, &["ok"])]);
    let options = StreamOptions::new().query("q", "1").header("X-Key", "k");
    let streamer = single(&transport, options);

    assert_eq!(collect_bytes(streamer).await.unwrap(), "ok");

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], requests[1]);
    assert_eq!(requests[0].query.get("q"), Some(&"1".to_string()));
    assert_eq!(transport.bodies_dropped(), 2);
}

#[tokio::test]
async fn test_unexpected_status_fails() {
    let transport = ScriptedTransport::new(vec![respond(500, &["oops"])]);
    let mut streamer = single(&transport, StreamOptions::default());

    let err = streamer.next().await.unwrap().unwrap_err();
    assert_eq!(
        err.to_string(),
        "GET request failed with status 500 Internal Server Error"
    );
    assert_eq!(streamer.state(), StreamState::Failed);
    assert!(streamer.next().await.is_none());
    assert_eq!(transport.bodies_dropped(), 1);
}

#[tokio::test]
async fn test_transport_error_degrades() {
    let transport = ScriptedTransport::new(vec![Step::Refuse]);
    let streamer = single(&transport, StreamOptions::default());

    assert_eq!(collect_bytes(streamer).await.unwrap(), "");
}

#[tokio::test]
async fn test_transport_error_aborts() {
    let transport = ScriptedTransport::new(vec![Step::Refuse]);
    let mut streamer = single(&transport, StreamOptions::new().abort_on_error(true));

    let err = streamer.next().await.unwrap().unwrap_err();
    assert!(err.is_transport());
    assert!(streamer.next().await.is_none());
}

#[tokio::test]
async fn test_body_error_flushes_transform() {
    let transport = ScriptedTransport::new(vec![broken_body(&["one\ntw", "o\nthr"])]);
    let streamer = single(
        &transport,
        StreamOptions::new().transform(factory(LinesTransform::new)),
    );

    // Lines seen before the reset are kept; the partial line is flushed on end
    assert_eq!(collect_bytes(streamer).await.unwrap(), "onetwothr");
}

#[tokio::test]
async fn test_body_error_aborts_with_transform() {
    let transport = ScriptedTransport::new(vec![broken_body(&["{\"a\": 1}\n"])]);
    let mut streamer = single(
        &transport,
        StreamOptions::new()
            .transform(factory(JsonLinesTransform::new))
            .abort_on_error(true),
    );

    let first = streamer.next().await.unwrap().unwrap();
    assert_eq!(first.as_object(), Some(&json!({"a": 1})));
    assert!(streamer.next().await.unwrap().is_err());
    assert!(streamer.next().await.is_none());
}

#[tokio::test]
async fn test_transform_output() {
    let transport = ScriptedTransport::new(vec![respond(
        200,
        &[r#"{"data": [{"id": 1}, "#, r#"{"id": 2}]}"#],
    )]);
    let options = StreamOptions::new().transform(DecoderConfig::json_with_path("data").factory().unwrap());
    let streamer = single(&transport, options);

    let records: Vec<Value> = streamer
        .map(|c| c.unwrap().as_object().cloned().unwrap())
        .collect()
        .await;
    assert_eq!(records, vec![json!({"id": 1}), json!({"id": 2})]);
}

#[tokio::test]
async fn test_transform_error_degrades() {
    let transport = ScriptedTransport::new(vec![respond(200, &["{\"ok\": 1}\nnot json\n{\"ok\": 2}\n"])]);
    let mut streamer = single(
        &transport,
        StreamOptions::new().transform(factory(JsonLinesTransform::new)),
    );

    let first = streamer.next().await.unwrap().unwrap();
    assert_eq!(first.as_object(), Some(&json!({"ok": 1})));
    assert!(streamer.next().await.is_none());
}

#[tokio::test]
async fn test_with_transform_instance() {
    let transport = ScriptedTransport::new(vec![respond(200, &["a\nb\n"])]);
    let streamer =
        single(&transport, StreamOptions::default()).with_transform(Box::new(LinesTransform::new()));

    let chunks: Vec<Result<Chunk>> = streamer.collect().await;
    assert_eq!(chunks.len(), 2);
}

#[tokio::test]
async fn test_deferred_accept_is_protocol_violation() {
    let transport = ScriptedTransport::new(vec![respond(503, &[])]);
    let policy = |_: &ResponseMeta, _: &RequestDescriptor| -> Result<Verdict> {
        Ok(Verdict::Defer(async { Ok(true) }.boxed()))
    };
    let mut streamer = single(&transport, StreamOptions::new().policy(policy));

    let err = streamer.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::ProtocolViolation { .. }));
    assert!(streamer.next().await.is_none());
}

#[tokio::test]
async fn test_deferred_retry() {
    let transport = ScriptedTransport::new(vec![respond(503, &[]), respond(200, &["late"])]);
    let policy = |meta: &ResponseMeta, _: &RequestDescriptor| -> Result<Verdict> {
        if meta.status == StatusCode::OK {
            Ok(Verdict::Accept)
        } else {
            Ok(Verdict::Defer(async { Ok(false) }.boxed()))
        }
    };
    let streamer = single(&transport, StreamOptions::new().policy(policy));

    assert_eq!(collect_bytes(streamer).await.unwrap(), "late");
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_max_retries_exceeded() {
    let transport = ScriptedTransport::new(vec![
        respond(429, &[]),
        respond(429, &[]),
        respond(429, &[]),
    ]);
    let mut streamer = single(
        &transport,
        StreamOptions::new().max_retries(2).abort_on_error(true),
    );

    let err = streamer.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::MaxRetriesExceeded { max_retries: 2 }));
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_max_retries_degrades() {
    let transport = ScriptedTransport::new(vec![respond(429, &[]), respond(429, &[])]);
    let streamer = single(&transport, StreamOptions::new().max_retries(1));

    assert_eq!(collect_bytes(streamer).await.unwrap(), "");
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_destroy_with_reason() {
    let transport = ScriptedTransport::new(vec![Step::Hang(200, vec!["first"])]);
    let mut streamer = single(&transport, StreamOptions::default());

    assert!(streamer.next().await.unwrap().is_ok());
    assert_eq!(streamer.state(), StreamState::Streaming);

    streamer.destroy(Some(Error::cancelled("consumer gone")));
    assert_eq!(transport.bodies_dropped(), 1);

    let err = streamer.next().await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Cancelled { .. }));
    assert!(streamer.next().await.is_none());

    // A second destroy is a no-op
    streamer.destroy(None);
    assert!(streamer.next().await.is_none());
    assert_eq!(transport.bodies_dropped(), 1);
}

#[tokio::test]
async fn test_destroy_without_reason() {
    let transport = ScriptedTransport::new(vec![Step::Hang(200, vec!["first"])]);
    let mut streamer = single(&transport, StreamOptions::default());

    assert!(streamer.next().await.is_some());
    streamer.destroy(None);

    assert_eq!(streamer.state(), StreamState::Terminal);
    assert!(streamer.next().await.is_none());
    assert_eq!(transport.bodies_dropped(), 1);
}

#[tokio::test]
async fn test_drop_releases_body() {
    let transport = ScriptedTransport::new(vec![Step::Hang(200, vec!["first"])]);
    let mut streamer = single(&transport, StreamOptions::default());

    assert!(streamer.next().await.is_some());
    drop(streamer);
    assert_eq!(transport.bodies_dropped(), 1);
}

#[tokio::test]
async fn test_destroy_before_start() {
    let transport = ScriptedTransport::new(vec![]);
    let mut streamer = single(&transport, StreamOptions::default());

    streamer.destroy(None);
    assert!(streamer.next().await.is_none());
    assert_eq!(transport.calls(), 0);
}

// ============================================================================
// Paginated Tests
// ============================================================================

/// Walks `/1` to `/4`, ignoring the page result
fn four_pages() -> impl Continuation {
    |page: &mut RequestDescriptor, _: Option<&Value>| -> Result<bool> {
        let current: u32 = page
            .url
            .path()
            .trim_start_matches('/')
            .parse()
            .map_err(|_| Error::continuation("unexpected path"))?;
        if current >= 4 {
            return Ok(false);
        }
        page.set_url(&format!("/{}", current + 1))?;
        Ok(true)
    }
}

fn paginated(
    transport: &Arc<ScriptedTransport>,
    continuation: impl Continuation + 'static,
    options: StreamOptions,
) -> PaginatedStreamer {
    PaginatedStreamer::new(transport.clone(), URL, continuation, options).unwrap()
}

#[tokio::test]
async fn test_pages_concatenate() {
    let transport = ScriptedTransport::new(vec![
        respond(200, &["d"]),
        respond(200, &["a"]),
        respond(429, &[]),
        respond(200, &["t"]),
        respond(200, &["a"]),
    ]);
    let mut streamer = paginated(&transport, four_pages(), StreamOptions::default());

    assert_eq!(collect_bytes(&mut streamer).await.unwrap(), "data");
    assert_eq!(streamer.page_count(), 4);
    assert_eq!(streamer.state(), StreamState::Terminal);

    let paths: Vec<String> = transport
        .requests()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(paths, vec!["/1", "/2", "/3", "/3", "/4"]);
    assert_eq!(transport.bodies_dropped(), 5);
}

#[tokio::test]
async fn test_missing_page_still_advances() {
    let transport = ScriptedTransport::new(vec![
        respond(200, &["d"]),
        respond(200, &["a"]),
        respond(404, &[]),
        respond(200, &["t", "a"]),
    ]);
    let streamer = paginated(&transport, four_pages(), StreamOptions::default());

    assert_eq!(collect_bytes(streamer).await.unwrap(), "data");
}

#[tokio::test]
async fn test_failed_page_degrades_to_next_page() {
    let transport = ScriptedTransport::new(vec![
        respond(200, &["d"]),
        Step::Refuse,
        respond(200, &["at"]),
        respond(200, &["a"]),
    ]);
    let streamer = paginated(&transport, four_pages(), StreamOptions::default());

    assert_eq!(collect_bytes(streamer).await.unwrap(), "data");
}

#[tokio::test]
async fn test_failed_page_aborts() {
    let transport = ScriptedTransport::new(vec![respond(200, &["d"]), Step::Refuse]);
    let mut streamer = paginated(
        &transport,
        four_pages(),
        StreamOptions::new().abort_on_error(true),
    );

    assert!(streamer.next().await.unwrap().is_ok());
    assert!(streamer.next().await.unwrap().is_err());
    assert!(streamer.next().await.is_none());
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_unexpected_status_stops_pagination() {
    let transport = ScriptedTransport::new(vec![respond(200, &["d"]), respond(502, &[])]);
    let mut streamer = paginated(&transport, four_pages(), StreamOptions::default());

    assert!(streamer.next().await.unwrap().is_ok());
    let err = streamer.next().await.unwrap().unwrap_err();
    assert!(err.to_string().contains("502"));
    assert!(streamer.next().await.is_none());
}

#[tokio::test]
async fn test_continuation_error_ends_cleanly() {
    let transport = ScriptedTransport::new(vec![respond(200, &["only"])]);
    let continuation = |_: &mut RequestDescriptor, _: Option<&Value>| -> Result<bool> {
        Err(Error::continuation("bad cursor"))
    };
    let streamer = paginated(&transport, continuation, StreamOptions::default());

    assert_eq!(collect_bytes(streamer).await.unwrap(), "only");
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_page_result_reaches_continuation() {
    let transport = ScriptedTransport::new(vec![
        respond(200, &[r#"{"items": [1, 2], "next": "/2"}"#]),
        respond(200, &[r#"{"items": [3], "next": null}"#]),
    ]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&seen);
    let continuation = move |page: &mut RequestDescriptor, data: Option<&Value>| -> Result<bool> {
        recorder.lock().unwrap().push(data.cloned());
        match data.and_then(|d| d["next"].as_str()) {
            Some(next) => {
                page.set_url(next)?;
                Ok(true)
            }
            None => Ok(false),
        }
    };
    let options = StreamOptions::new().transform(DecoderConfig::json_with_path("items").factory().unwrap());
    let streamer = paginated(&transport, continuation, options);

    let records: Vec<Value> = streamer
        .map(|c| c.unwrap().as_object().cloned().unwrap())
        .collect()
        .await;
    assert_eq!(records, vec![json!(1), json!(2), json!(3)]);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].as_ref().unwrap()["next"], "/2");
}

#[tokio::test]
async fn test_continuation_sees_a_copy() {
    let transport = ScriptedTransport::new(vec![respond(200, &["x"])]);
    let continuation = |page: &mut RequestDescriptor, _: Option<&Value>| -> Result<bool> {
        page.query.insert("mutated".to_string(), "yes".to_string());
        Ok(false)
    };
    let mut streamer = paginated(&transport, continuation, StreamOptions::default());

    while streamer.next().await.is_some() {}
    assert!(streamer.request().query.is_empty());
}

#[tokio::test]
async fn test_paginated_destroy_mid_page() {
    let transport = ScriptedTransport::new(vec![
        respond(200, &["d"]),
        Step::Hang(200, vec!["a"]),
    ]);
    let mut streamer = paginated(&transport, four_pages(), StreamOptions::default());

    assert!(streamer.next().await.is_some());
    assert!(streamer.next().await.is_some());
    assert_eq!(streamer.page_count(), 2);

    streamer.destroy(Some(Error::cancelled("shutdown")));
    assert!(matches!(
        streamer.next().await,
        Some(Err(Error::Cancelled { .. }))
    ));
    assert!(streamer.next().await.is_none());
    assert_eq!(transport.calls(), 2);
    assert_eq!(transport.bodies_dropped(), 2);
}

/// Never answers, so the stream parks in `Completing`
struct Stalled;

#[async_trait]
impl Continuation for Stalled {
    async fn next_page(&mut self, _: &mut RequestDescriptor, _: Option<&Value>) -> Result<bool> {
        futures::future::pending().await
    }
}

#[tokio::test]
async fn test_paginated_destroy_while_completing() {
    let transport = ScriptedTransport::new(vec![respond(200, &["d"])]);
    let mut streamer = paginated(&transport, Stalled, StreamOptions::default());

    assert!(streamer.next().await.is_some());
    {
        let mut next = tokio_test::task::spawn(streamer.next());
        tokio_test::assert_pending!(next.poll());
    }
    assert_eq!(streamer.state(), StreamState::Completing);

    streamer.destroy(None);
    assert_eq!(streamer.state(), StreamState::Terminal);
    assert!(streamer.next().await.is_none());
    assert_eq!(transport.calls(), 1);
}
