//! Incoming HTTP request type.

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Uri, Version};

/// An incoming HTTP request with its body fully buffered.
///
/// Owned by the transport layer and read-only to handlers: there are no
/// mutating accessors.
pub struct Request {
    parts: Parts,
    body: Bytes,
}

impl Request {
    pub(crate) fn from_parts(parts: Parts, body: Bytes) -> Self {
        Self { parts, body }
    }

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn query(&self) -> Option<&str> { self.parts.uri.query() }
    pub fn version(&self) -> Version { self.parts.version }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// Header lookup. Names are case-insensitive; values that are not visible
    /// ASCII come back as `None`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.parts.headers.get(name)?.to_str().ok()
    }

    /// Rebuilds a transport-native request. The body is reference-counted, so
    /// this does not copy it.
    pub(crate) fn to_http(&self) -> http::Request<Bytes> {
        let mut req = http::Request::new(self.body.clone());
        *req.method_mut() = self.parts.method.clone();
        *req.uri_mut() = self.parts.uri.clone();
        *req.version_mut() = self.parts.version;
        *req.headers_mut() = self.parts.headers.clone();
        req
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body)
    }
}
