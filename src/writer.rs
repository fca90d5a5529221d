//! The response sink handlers write into.
//!
//! A [`ResponseWriter`] has two phases. Before the status is committed,
//! headers are freely mutable. [`ResponseWriter::write_header`], or the first
//! body write, commits the status together with a snapshot of the headers at
//! that moment. Anything done to the headers afterwards is kept in the live
//! map but never reaches the wire; a second `write_header` is ignored.

use std::io;

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::Full;
use tracing::warn;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for [`Context::bytes`](crate::Context::bytes).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }

    pub(crate) fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// Write-once response sink for a single request.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    headers: HeaderMap,
    committed: Option<(StatusCode, HeaderMap)>,
    body: BytesMut,
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The live header map. Once the status is committed these are no longer
    /// the headers that will be sent; see [`sent_headers`](Self::sent_headers).
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    /// Commits `status` and the current headers. Only the first call has any
    /// effect.
    pub fn write_header(&mut self, status: StatusCode) {
        if let Some((committed, _)) = &self.committed {
            warn!(%committed, ignored = %status, "superfluous write_header call");
            return;
        }
        self.committed = Some((status, self.headers.clone()));
    }

    pub fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    /// The status that will be sent: the committed one, or `200 OK`.
    pub fn status(&self) -> StatusCode {
        self.committed.as_ref().map_or(StatusCode::OK, |(status, _)| *status)
    }

    /// The headers that will be sent.
    pub fn sent_headers(&self) -> &HeaderMap {
        self.committed.as_ref().map_or(&self.headers, |(_, headers)| headers)
    }

    pub fn body(&self) -> &[u8] { &self.body }

    /// Appends to the body, committing `200 OK` first if nothing was
    /// committed yet.
    pub fn write_body(&mut self, buf: &[u8]) {
        if self.committed.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
    }

    pub(crate) fn into_response(self) -> http::Response<Full<Bytes>> {
        let (status, headers) = self.committed.unwrap_or((StatusCode::OK, self.headers));
        let mut res = http::Response::new(Full::new(self.body.freeze()));
        *res.status_mut() = status;
        *res.headers_mut() = headers;
        res
    }
}

/// Same as [`ResponseWriter::write_body`], for encoders that want a writer.
/// Never fails.
impl io::Write for ResponseWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_body(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
