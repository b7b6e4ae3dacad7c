//! Scripted transport for tests.
//!
//! [`MockTransport`] replays canned responses, records every request it sees
//! (headers and fully collected body), and counts response-body drops so
//! tests can assert that a call released its transport slot exactly once.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, StatusCode};
use http_body_util::BodyExt;

use super::{Transport, TransportBody, TransportFuture};
use crate::ClientError;

/// One scripted exchange.
pub(crate) enum MockBehavior {
    /// Answer with a canned response.
    Respond(MockResponse),
    /// Never resolve; exercises local deadlines.
    Hang,
}

/// A canned response.
pub(crate) struct MockResponse {
    pub status: StatusCode,
    pub headers: Vec<(&'static str, String)>,
    pub chunks: Vec<Bytes>,
    /// Keep the body open (pending) after the chunks instead of EOF.
    pub then_pending: bool,
}

impl MockResponse {
    pub fn new(status: StatusCode, chunks: Vec<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            chunks,
            then_pending: false,
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn then_pending(mut self) -> Self {
        self.then_pending = true;
        self
    }
}

/// A request as the transport saw it.
pub(crate) struct RecordedRequest {
    pub uri: http::Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Transport replaying a script of [`MockBehavior`]s.
pub(crate) struct MockTransport {
    script: Mutex<VecDeque<MockBehavior>>,
    pub requests: Mutex<Vec<RecordedRequest>>,
    pub releases: Arc<AtomicUsize>,
}

impl MockTransport {
    pub fn new(script: Vec<MockBehavior>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            releases: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn respond_with(response: MockResponse) -> Arc<Self> {
        Self::new(vec![MockBehavior::Respond(response)])
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn recorded(&self, index: usize) -> RecordedRequest {
        let mut requests = self.requests.lock().unwrap();
        assert!(index < requests.len(), "no request recorded at {}", index);
        requests.remove(index)
    }
}

impl Transport for Arc<MockTransport> {
    fn send(&self, request: http::Request<TransportBody>) -> TransportFuture {
        let this = Arc::clone(self);
        Box::pin(async move {
            let (parts, body) = request.into_parts();

            // Collecting drives streaming request bodies to completion,
            // matching the half-duplex contract.
            let body = body.collect().await?.to_bytes();

            this.requests.lock().unwrap().push(RecordedRequest {
                uri: parts.uri,
                headers: parts.headers,
                body,
            });

            let behavior = this
                .script
                .lock()
                .unwrap()
                .pop_front()
                .expect("mock transport script exhausted");

            match behavior {
                MockBehavior::Hang => {
                    futures::future::pending::<()>().await;
                    unreachable!()
                }
                MockBehavior::Respond(response) => {
                    let mut builder = http::Response::builder().status(response.status);
                    for (name, value) in &response.headers {
                        builder = builder.header(*name, value);
                    }
                    let body = MockBody {
                        chunks: response.chunks.into(),
                        then_pending: response.then_pending,
                        releases: Arc::clone(&this.releases),
                    };
                    let response = builder
                        .body(Box::pin(body) as super::BoxByteStream)
                        .expect("mock response construction");
                    Ok(response)
                }
            }
        })
    }
}

/// Response body that counts its own drop as a slot release.
struct MockBody {
    chunks: VecDeque<Bytes>,
    then_pending: bool,
    releases: Arc<AtomicUsize>,
}

impl Stream for MockBody {
    type Item = Result<Bytes, ClientError>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.chunks.pop_front() {
            Some(chunk) => Poll::Ready(Some(Ok(chunk))),
            None if self.then_pending => Poll::Pending,
            None => Poll::Ready(None),
        }
    }
}

impl Drop for MockBody {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
