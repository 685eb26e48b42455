//! Transport error types.

use std::time::Duration;

use thiserror::Error;

/// A request that did not reach the target or did not complete.
///
/// Non-2xx HTTP statuses are not errors: they come back as an
/// [`HttpResponse`](crate::HttpResponse).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("gRPC client is not connected")]
    NotConnected,

    #[error("gRPC call returned {code}: {message}")]
    Status { code: String, message: String },
}

pub type TransportResult<T> = Result<T, TransportError>;
