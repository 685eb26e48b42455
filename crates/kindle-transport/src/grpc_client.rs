//! gRPC transport backed by a single tonic channel.
//!
//! Calls are made without generated stubs: the request message is sent as
//! the already-encoded request payload through a pass-through codec and the
//! response payload is discarded. An empty message is a valid empty protobuf
//! message, which is what health checks such as
//! `grpc.health.v1.Health/Check` expect.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes};
use http::uri::PathAndQuery;
use kindle_core::Headers;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tonic::Status;
use tonic::codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder};
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue};
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info};

use crate::{BoxFuture, GrpcResponse, GrpcTransport, TransportError, TransportResult};

/// gRPC client for one `host:port`.
///
/// [`GrpcTransport::connect`] establishes the channel once; every call made
/// afterwards shares it until [`GrpcTransport::close`].
pub struct GrpcClient {
    endpoint: String,
    timeout: Duration,
    state: RwLock<Option<Connection>>,
}

struct Connection {
    channel: Channel,
    /// Headers given at connect time, attached to every call.
    headers: Headers,
}

impl GrpcClient {
    /// `address` may be `host:port` or a full `http://host:port` URI.
    pub fn new(address: &str, timeout: Duration) -> Self {
        let endpoint = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        Self {
            endpoint,
            timeout,
            state: RwLock::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.is_some()
    }

    async fn open(&self, headers: &Headers) -> TransportResult<()> {
        let endpoint = Endpoint::from_shared(self.endpoint.clone())
            .map_err(|e| TransportError::Connect(format!("invalid endpoint {}: {e}", self.endpoint)))?
            .connect_timeout(self.timeout)
            .timeout(self.timeout);

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| TransportError::Connect(format!("connect to {}: {e}", self.endpoint)))?;

        info!(endpoint = %self.endpoint, "gRPC client connected");
        *self.state.write().await = Some(Connection {
            channel,
            headers: headers.clone(),
        });
        Ok(())
    }

    async fn invoke(
        &self,
        service_method: &str,
        message: &str,
        headers: &Headers,
    ) -> TransportResult<GrpcResponse> {
        let (channel, mut metadata) = {
            let state = self.state.read().await;
            let connection = state.as_ref().ok_or(TransportError::NotConnected)?;
            (connection.channel.clone(), connection.headers.clone())
        };
        metadata.extend(headers.iter().cloned());

        let path = PathAndQuery::try_from(format!("/{}", service_method.trim_start_matches('/')))
            .map_err(|e| TransportError::InvalidRequest(format!("{service_method}: {e}")))?;

        let mut request = tonic::Request::new(Bytes::copy_from_slice(message.as_bytes()));
        for (name, value) in &metadata {
            let key = AsciiMetadataKey::from_bytes(name.to_ascii_lowercase().as_bytes())
                .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
            let value = AsciiMetadataValue::try_from(value.as_str())
                .map_err(|e| TransportError::InvalidRequest(format!("header {name}: {e}")))?;
            request.metadata_mut().append(key, value);
        }

        let started = Instant::now();
        let mut grpc = tonic::client::Grpc::new(channel);
        grpc.ready()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        grpc.unary(request, path, RawCodec)
            .await
            .map_err(|status| TransportError::Status {
                code: format!("{:?}", status.code()),
                message: status.message().to_string(),
            })?;

        let duration = started.elapsed();
        debug!(%service_method, elapsed_ms = duration.as_millis() as u64, "gRPC call completed");
        Ok(GrpcResponse { duration })
    }

    async fn shutdown(&self) -> TransportResult<()> {
        if self.state.write().await.take().is_some() {
            info!(endpoint = %self.endpoint, "gRPC client connection closed");
        }
        Ok(())
    }
}

impl GrpcTransport for GrpcClient {
    fn connect<'a>(&'a self, headers: &'a Headers) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(self.open(headers))
    }

    fn send<'a>(
        &'a self,
        service_method: &'a str,
        message: &'a str,
        headers: &'a Headers,
    ) -> BoxFuture<'a, TransportResult<GrpcResponse>> {
        Box::pin(self.invoke(service_method, message, headers))
    }

    fn close(&self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(self.shutdown())
    }
}

/// Codec that passes payload bytes through untouched.
#[derive(Debug, Clone, Copy, Default)]
struct RawCodec;

#[derive(Debug, Clone, Copy, Default)]
struct RawEncoder;

#[derive(Debug, Clone, Copy, Default)]
struct RawDecoder;

impl Codec for RawCodec {
    type Encode = Bytes;
    type Decode = Bytes;
    type Encoder = RawEncoder;
    type Decoder = RawDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        RawEncoder
    }

    fn decoder(&mut self) -> Self::Decoder {
        RawDecoder
    }
}

impl Encoder for RawEncoder {
    type Item = Bytes;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        dst.put(item);
        Ok(())
    }
}

impl Decoder for RawDecoder {
    type Item = Bytes;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let len = src.remaining();
        Ok(Some(src.copy_to_bytes(len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_gets_http_scheme() {
        assert_eq!(GrpcClient::new("localhost:50051", Duration::from_secs(1)).endpoint(), "http://localhost:50051");
        assert_eq!(GrpcClient::new("http://svc:9000", Duration::from_secs(1)).endpoint(), "http://svc:9000");
    }

    #[tokio::test]
    async fn send_before_connect_fails() {
        let client = GrpcClient::new("localhost:50051", Duration::from_secs(1));
        let err = client
            .send("grpc.health.v1.Health/Check", "", &Headers::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn close_without_connect_is_ok() {
        let client = GrpcClient::new("localhost:50051", Duration::from_secs(1));
        client.close().await.unwrap();
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = GrpcClient::new(&addr.to_string(), Duration::from_millis(500));
        let err = client.connect(&Headers::new()).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
        assert!(!client.is_connected().await);
    }
}
