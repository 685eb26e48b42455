//! Readiness target options.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};
use crate::request::GrpcRequest;

/// Protocol used to check whether the target is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessProtocol {
    Http,
    Grpc,
}

impl FromStr for ReadinessProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(ReadinessProtocol::Http),
            "grpc" => Ok(ReadinessProtocol::Grpc),
            other => Err(ConfigError::UnsupportedProtocol(other.to_string())),
        }
    }
}

impl fmt::Display for ReadinessProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessProtocol::Http => f.write_str("http"),
            ReadinessProtocol::Grpc => f.write_str("grpc"),
        }
    }
}

/// How and for how long to wait for the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOptions {
    pub protocol: ReadinessProtocol,
    /// Path probed with `GET` when the protocol is HTTP.
    pub http_path: String,
    /// Method invoked with an empty message when the protocol is gRPC.
    pub grpc_method: GrpcRequest,
    pub port: u16,
    /// Derived from the run's time budget.
    pub timeout: Duration,
}

impl TargetOptions {
    /// Validate raw readiness settings.
    pub fn new(
        protocol: &str,
        http_path: &str,
        grpc_method: &str,
        port: u16,
        timeout: Duration,
    ) -> ConfigResult<Self> {
        let protocol = protocol.parse()?;
        let grpc_method = GrpcRequest::parse(grpc_method)?;
        Ok(Self {
            protocol,
            http_path: http_path.to_string(),
            grpc_method,
            port,
            timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_http_and_grpc() {
        assert_eq!("http".parse::<ReadinessProtocol>().unwrap(), ReadinessProtocol::Http);
        assert_eq!("grpc".parse::<ReadinessProtocol>().unwrap(), ReadinessProtocol::Grpc);
    }

    #[test]
    fn rejects_other_protocols() {
        let err = TargetOptions::new(
            "tcp",
            "/ready",
            "grpc.health.v1.Health/Check",
            8080,
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "readiness protocol tcp not supported, please use http or grpc"
        );
    }

    #[test]
    fn grpc_method_is_validated_up_front() {
        let err = TargetOptions::new("grpc", "/ready", "Check", 50051, Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidGrpcRequest("Check".to_string()));
    }
}
