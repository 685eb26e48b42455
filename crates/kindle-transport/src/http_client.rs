//! HTTP transport backed by a pooled hyper client.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use kindle_core::Headers;
use tokio::time::Instant;
use tracing::debug;

use crate::{BoxFuture, HttpResponse, HttpTransport, TransportError, TransportResult};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client bound to a single base URL such as `http://localhost:8080`.
///
/// Connections are pooled, so one client can be shared by every worker.
#[derive(Clone)]
pub struct HttpClient {
    client: Client<HttpConnector, Full<Bytes>>,
    base_url: String,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn execute(
        &self,
        method: &str,
        path: &str,
        headers: &Headers,
        body: Option<Bytes>,
    ) -> TransportResult<HttpResponse> {
        let uri = self.url(path);

        let mut builder = http::Request::builder().method(method).uri(&uri);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let request = builder
            .body(Full::new(body.unwrap_or_default()))
            .map_err(|e| TransportError::InvalidRequest(format!("{method} {uri}: {e}")))?;

        let started = Instant::now();
        let status = tokio::time::timeout(self.timeout, async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;
            let status = response.status().as_u16();

            // Drain the body so the connection goes back to the pool.
            response
                .into_body()
                .collect()
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;
            Ok::<_, TransportError>(status)
        })
        .await
        .map_err(|_| TransportError::Timeout(self.timeout))??;

        let duration = started.elapsed();
        debug!(%method, %uri, status, elapsed_ms = duration.as_millis() as u64, "http call completed");
        Ok(HttpResponse { duration, status })
    }
}

impl HttpTransport for HttpClient {
    fn send<'a>(
        &'a self,
        method: &'a str,
        path: &'a str,
        headers: &'a Headers,
        body: Option<Bytes>,
    ) -> BoxFuture<'a, TransportResult<HttpResponse>> {
        Box::pin(self.execute(method, path, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::net::SocketAddr;

    use hyper::body::Incoming;
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response};
    use hyper_util::rt::TokioIo;
    use tokio::net::TcpListener;

    use super::*;

    /// Serve every request with `status`, echoing `x-marker` and the request body size.
    async fn spawn_server(status: u16) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let svc = service_fn(move |req: Request<Incoming>| async move {
                        let marker = req
                            .headers()
                            .get("x-marker")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("")
                            .to_string();
                        let body = req.into_body().collect().await.unwrap().to_bytes();
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(status)
                                .header("x-echo", marker)
                                .body(Full::new(Bytes::from(body.len().to_string())))
                                .unwrap(),
                        )
                    });
                    let _ = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), svc)
                        .await;
                });
            }
        });

        addr
    }

    #[tokio::test]
    async fn reports_success_status() {
        let addr = spawn_server(204).await;
        let client = HttpClient::new(&format!("http://{addr}/"), DEFAULT_TIMEOUT);

        let headers = vec![("x-marker".to_string(), "warm".to_string())];
        let response = client
            .send("POST", "ping", &headers, Some(Bytes::from_static(b"hello")))
            .await
            .unwrap();

        assert_eq!(response.status, 204);
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn non_2xx_is_a_response_not_an_error() {
        let addr = spawn_server(503).await;
        let client = HttpClient::new(&format!("http://{addr}"), DEFAULT_TIMEOUT);

        let response = client.send("GET", "/ready", &Headers::new(), None).await.unwrap();
        assert_eq!(response.status, 503);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn closed_port_is_a_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpClient::new(&format!("http://{addr}"), Duration::from_millis(500));
        let err = client.send("GET", "/ready", &Headers::new(), None).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Request(_) | TransportError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn invalid_header_is_rejected_before_sending() {
        let client = HttpClient::new("http://127.0.0.1:1", DEFAULT_TIMEOUT);
        let headers = vec![("bad header".to_string(), "x".to_string())];
        let err = client.send("GET", "/", &headers, None).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
    }

    #[test]
    fn url_joins_base_and_path() {
        let client = HttpClient::new("http://localhost:8080/", DEFAULT_TIMEOUT);
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/ready"), "http://localhost:8080/ready");
        assert_eq!(client.url("ready"), "http://localhost:8080/ready");
    }
}
