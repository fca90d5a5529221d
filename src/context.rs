//! Per-request context.
//!
//! One [`Context`] exists per inbound request. The router builds it right
//! before invoking the handler, passes it by `&mut` through every middleware
//! and drops it once the response has been taken out of its writer.

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::request::Request;
use crate::writer::{ContentType, ResponseWriter};

// ── Params ────────────────────────────────────────────────────────────────────

/// Path parameters extracted by the router, in pattern order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value of the first parameter named `name`.
    ///
    /// For a route `/users/{id}`, `params.get("id")` on `/users/42` returns
    /// `Some("42")`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// A single HTTP request/response cycle.
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    writer: ResponseWriter,
    request: Request,
    params: Params,
}

impl Context {
    /// Bundles a request with its response sink and path parameters. Every
    /// call creates a new top-level cancellation token.
    pub fn new(writer: ResponseWriter, request: Request, params: Params) -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
            writer,
            request,
            params,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Cancelled when the request is abandoned. Clone it into spawned work
    /// that should stop with the request.
    pub fn cancellation(&self) -> &CancellationToken { &self.cancel }
    pub fn deadline(&self) -> Option<Instant> { self.deadline }

    /// Non-blocking form of [`done`](Self::done): true once the token is
    /// cancelled or the deadline has passed.
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| d <= Instant::now())
    }

    /// Resolves once the request is cancelled or its deadline has passed.
    /// Nothing is enforced here: handlers decide what to do about it.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.cancel.cancelled() => {}
                () = tokio::time::sleep_until(deadline) => {}
            },
            None => self.cancel.cancelled().await,
        }
    }

    pub fn request(&self) -> &Request { &self.request }
    pub fn params(&self) -> &Params { &self.params }
    pub fn param(&self, name: &str) -> Option<&str> { self.params.get(name) }

    pub fn writer(&self) -> &ResponseWriter { &self.writer }
    pub fn writer_mut(&mut self) -> &mut ResponseWriter { &mut self.writer }
    pub fn into_writer(self) -> ResponseWriter { self.writer }

    /// Encodes `value` as JSON and writes it with `status`.
    ///
    /// Sets `content-length` to the exact encoded length and `content-type`
    /// to `application/json`. If encoding fails the error is returned and the
    /// response is left untouched; choosing a status for that case is up to
    /// the caller.
    ///
    /// Call this at most once per request. A second call appends a second
    /// payload while the first call's headers and status stay on the wire.
    /// The committed `content-length` then covers only the first payload, so
    /// the transport sees a body longer than announced and drops the
    /// connection.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) -> Result<(), Error> {
        let data = serde_json::to_vec(value)?;
        self.bytes(status, ContentType::Json, &data);
        Ok(())
    }

    /// Writes a `text/plain; charset=utf-8` body with `status`.
    pub fn text(&mut self, status: StatusCode, body: impl AsRef<str>) {
        self.bytes(status, ContentType::Text, body.as_ref().as_bytes());
    }

    /// Writes `body` with `status` and the given content type.
    pub fn bytes(&mut self, status: StatusCode, content_type: ContentType, body: &[u8]) {
        let headers = self.writer.headers_mut();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        headers.insert(CONTENT_TYPE, content_type.header_value());
        self.writer.write_header(status);
        self.writer.write_body(body);
    }
}
