//! kindle-transport: the wire-level capability the warmup engine consumes.
//!
//! The engine never opens sockets itself. It talks to a target through the
//! [`HttpTransport`] and [`GrpcTransport`] traits, which are implemented here
//! by [`HttpClient`] (hyper) and [`GrpcClient`] (tonic), and by in-memory
//! fakes in tests.
//!
//! # Architecture
//!
//! ```text
//! Arc<dyn HttpTransport>  ── shared by every HTTP worker
//!   └── HttpClient (pooled hyper-util client, per-request timeout)
//! Arc<dyn GrpcTransport>  ── shared by every gRPC worker
//!   └── GrpcClient (one tonic Channel, connected once, closed once)
//! ```

pub mod error;
pub mod grpc_client;
pub mod http_client;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use kindle_core::Headers;

pub use error::{TransportError, TransportResult};
pub use grpc_client::GrpcClient;
pub use http_client::HttpClient;

/// Boxed future returned by transport calls.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of an HTTP call that reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpResponse {
    pub duration: Duration,
    pub status: u16,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outcome of a gRPC call that completed with an OK status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrpcResponse {
    pub duration: Duration,
}

/// Sends HTTP requests to the target.
pub trait HttpTransport: Send + Sync {
    /// Send one request; `path` is relative to the client's base URL.
    fn send<'a>(
        &'a self,
        method: &'a str,
        path: &'a str,
        headers: &'a Headers,
        body: Option<Bytes>,
    ) -> BoxFuture<'a, TransportResult<HttpResponse>>;
}

/// Invokes unary gRPC methods on the target over one shared connection.
pub trait GrpcTransport: Send + Sync {
    /// Establish the connection; `headers` are attached to every call.
    fn connect<'a>(&'a self, headers: &'a Headers) -> BoxFuture<'a, TransportResult<()>>;

    /// Invoke `service/method` with `message` as the request payload.
    fn send<'a>(
        &'a self,
        service_method: &'a str,
        message: &'a str,
        headers: &'a Headers,
    ) -> BoxFuture<'a, TransportResult<GrpcResponse>>;

    /// Drop the connection. Closing an unconnected client is not an error.
    fn close(&self) -> BoxFuture<'_, TransportResult<()>>;
}
