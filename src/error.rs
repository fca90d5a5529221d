//! Unified error type.

use std::net::AddrParseError;

use thiserror::Error;

/// The error type returned by chassis's fallible operations.
///
/// Application-level errors (404, 422, etc.) are expressed as HTTP responses
/// written through the [`Context`](crate::Context), not as `Error`s. This type
/// surfaces infrastructure failures: binding a port, accepting a connection,
/// encoding a response body or registering a malformed route.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// The value handed to [`Context::json`](crate::Context::json) could not
    /// be encoded. Nothing was written to the response.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid socket address: {0}")]
    Addr(#[from] AddrParseError),

    #[error("invalid route `{path}`: {source}")]
    Route {
        path: String,
        #[source]
        source: matchit::InsertError,
    },
}
