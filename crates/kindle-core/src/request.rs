//! Warmup request templates.
//!
//! HTTP templates use `<http-method>:<path>[:body]`, gRPC templates use
//! `<service>/<method>[:message]`. A body or message may be written inline
//! or as `file:<path>`, in which case the file is read when the template is
//! parsed. Path, body and message are run through the placeholder engine
//! once, at parse time.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use bytes::Bytes;
use flate2::Compression as Level;
use flate2::write::{DeflateEncoder, GzEncoder};

use crate::error::{ConfigError, ConfigResult};
use crate::headers::Headers;
use crate::placeholders::interpolate;

/// HTTP verbs accepted in request templates.
pub const ALLOWED_HTTP_METHODS: [&str; 9] = [
    "GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "CONNECT", "OPTIONS", "TRACE",
];

const FILE_PREFIX: &str = "file:";

/// Optional compression applied to HTTP bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Deflate,
    Brotli,
}

impl Compression {
    /// Value for the `Content-Encoding` header, if any.
    pub fn content_encoding(self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Gzip => Some("gzip"),
            Compression::Deflate => Some("deflate"),
            Compression::Brotli => Some("br"),
        }
    }

    fn compress(self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Level::default());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Compression::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Level::best());
                encoder.write_all(data)?;
                encoder.finish()
            }
            Compression::Brotli => {
                let mut writer = brotli::CompressorWriter::new(Vec::new(), 4096, 11, 22);
                writer.write_all(data)?;
                writer.flush()?;
                Ok(writer.into_inner())
            }
        }
    }
}

impl FromStr for Compression {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "deflate" => Ok(Compression::Deflate),
            "brotli" | "br" => Ok(Compression::Brotli),
            other => Err(ConfigError::UnsupportedCompression(other.to_string())),
        }
    }
}

/// A parsed, interpolated HTTP warmup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Upper-case verb from [`ALLOWED_HTTP_METHODS`].
    pub method: String,
    pub path: String,
    /// `None` when the template had no body segment.
    pub body: Option<Bytes>,
    /// Request-specific headers (currently only `Content-Encoding`).
    pub headers: Headers,
}

impl HttpRequest {
    /// Parse an HTTP template, optionally compressing its body.
    pub fn parse(template: &str, compression: Compression) -> ConfigResult<Self> {
        let parts: Vec<&str> = template.splitn(3, ':').collect();
        if parts.len() < 2 {
            return Err(ConfigError::InvalidHttpRequest(template.to_string()));
        }

        let method = parts[0].to_ascii_uppercase();
        if !ALLOWED_HTTP_METHODS.contains(&method.as_str()) {
            return Err(ConfigError::UnsupportedMethod {
                input: template.to_string(),
                method,
            });
        }

        let path = interpolate(parts[1]);

        // <method>:<path>
        let Some(raw_body) = parts.get(2) else {
            return Ok(Self {
                method,
                path,
                body: None,
                headers: Headers::new(),
            });
        };

        let body = interpolate(&read_body(raw_body)?);
        let compressed = compression
            .compress(body.as_bytes())
            .map_err(|_| ConfigError::Compression(raw_body.to_string()))?;

        let mut headers = Headers::new();
        if let Some(encoding) = compression.content_encoding() {
            headers.push(("Content-Encoding".to_string(), encoding.to_string()));
        }

        Ok(Self {
            method,
            path,
            body: Some(Bytes::from(compressed)),
            headers,
        })
    }

    /// Parse every template, stopping at the first invalid one.
    pub fn parse_all<S: AsRef<str>>(templates: &[S], compression: Compression) -> ConfigResult<Vec<Self>> {
        templates
            .iter()
            .map(|template| Self::parse(template.as_ref(), compression))
            .collect()
    }
}

impl FromStr for HttpRequest {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, Compression::None)
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A parsed, interpolated gRPC warmup request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrpcRequest {
    /// `<service>/<method>`.
    pub service_method: String,
    /// Never absent: a template without a message yields an empty one,
    /// since a unary call always needs a request message.
    pub message: String,
}

impl GrpcRequest {
    pub fn parse(template: &str) -> ConfigResult<Self> {
        let (service_method, raw_message) = match template.split_once(':') {
            Some((service_method, message)) => (service_method, Some(message)),
            None => (template, None),
        };

        if service_method.split('/').count() != 2 {
            return Err(ConfigError::InvalidGrpcRequest(template.to_string()));
        }

        let message = match raw_message {
            Some(raw) => interpolate(&read_body(raw)?),
            None => String::new(),
        };

        Ok(Self {
            service_method: service_method.to_string(),
            message,
        })
    }

    pub fn parse_all<S: AsRef<str>>(templates: &[S]) -> ConfigResult<Vec<Self>> {
        templates
            .iter()
            .map(|template| Self::parse(template.as_ref()))
            .collect()
    }

    /// The `/service/method` path used on the wire.
    pub fn rpc_path(&self) -> String {
        format!("/{}", self.service_method.trim_start_matches('/'))
    }
}

impl FromStr for GrpcRequest {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for GrpcRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.service_method)
    }
}

/// Resolve an inline body or a `file:<path>` reference.
fn read_body(raw: &str) -> ConfigResult<String> {
    match raw.strip_prefix(FILE_PREFIX) {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|_| ConfigError::UnreadableBody(raw.to_string())),
        None => Ok(raw.to_string()),
    }
}
