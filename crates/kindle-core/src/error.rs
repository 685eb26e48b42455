//! Configuration error types.

use thiserror::Error;

/// Errors raised while turning configuration into warmup inputs.
///
/// Every variant carries the offending raw input so the operator can
/// find it in their flags or config file. These are the only errors
/// that abort a run, and they are always raised before any network
/// activity starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid request flag: {0}, expected format <http-method>:<path>[:body]")]
    InvalidHttpRequest(String),

    #[error("invalid request flag: {input}, method {method} is not supported")]
    UnsupportedMethod { input: String, method: String },

    #[error("invalid request flag: {0}, expected format <service>/<method>[:body]")]
    InvalidGrpcRequest(String),

    #[error("unable to parse body for request: {0}")]
    UnreadableBody(String),

    #[error("unable to compress body for request: {0}")]
    Compression(String),

    #[error("unsupported compression: {0}, please use gzip, deflate or brotli")]
    UnsupportedCompression(String),

    #[error("readiness protocol {0} not supported, please use http or grpc")]
    UnsupportedProtocol(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
