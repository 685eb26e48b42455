//! Command-line flags and the JSON config file overlay.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser};
use kindle_core::{
    Compression, GrpcRequest, HttpRequest, TargetOptions, TimeBudget, parse_headers,
};
use kindle_probe::{FileProbe, ProbePaths};
use kindle_warmup::{PoolConfig, WarmupRequests};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Run settings. Every flag can also be set from a `--config` JSON file
/// using the flag name as key.
#[derive(Debug, Clone, PartialEq, Eq, Parser, Serialize, Deserialize)]
#[command(
    name = "kindle",
    about = "kindle: warm up a service before it takes traffic",
    version
)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// JSON file whose keys override the flags
    #[arg(long)]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Ceiling for the whole run, readiness wait included
    #[arg(long, default_value_t = 60)]
    pub max_duration_seconds: u64,
    /// Ceiling for the readiness wait (defaults to max-duration-seconds)
    #[arg(long)]
    pub max_readiness_wait_seconds: Option<u64>,
    /// Ceiling for the warmup phase (defaults to max-duration-seconds)
    #[arg(long)]
    pub max_warmup_seconds: Option<u64>,

    /// Concurrent workers per protocol
    #[arg(long, default_value_t = 2)]
    pub concurrency: usize,
    /// Pause before each warmup request
    #[arg(long, default_value_t = 250)]
    pub request_delay_milliseconds: u64,
    /// Start offset between consecutive workers
    #[arg(long, default_value_t = 0)]
    pub ramp_up_interval_seconds: u64,
    /// Exit once warmup is done instead of waiting for a termination signal
    #[arg(long)]
    pub exit_after_warmup: bool,
    /// Withhold readiness when no warmup request was sent
    #[arg(long)]
    pub fail_readiness: bool,

    #[arg(long, default_value = "http://localhost")]
    pub target_http_host: String,
    #[arg(long, default_value_t = 8080)]
    pub target_http_port: u16,
    #[arg(long, default_value = "localhost")]
    pub target_grpc_host: String,
    #[arg(long, default_value_t = 50051)]
    pub target_grpc_port: u16,
    /// Protocol of the readiness check: http or grpc
    #[arg(long, default_value = "http")]
    pub target_readiness_protocol: String,
    #[arg(long, default_value = "/ready")]
    pub target_readiness_http_path: String,
    #[arg(long, default_value = "grpc.health.v1.Health/Check")]
    pub target_readiness_grpc_method: String,
    /// Port of the readiness check (defaults to target-http-port)
    #[arg(long)]
    pub target_readiness_port: Option<u16>,

    /// HTTP request as <http-method>:<path>[:body], repeatable
    #[arg(long)]
    pub http_requests: Vec<String>,
    /// gzip, deflate or brotli
    #[arg(long)]
    pub http_requests_compression: Option<String>,
    /// Header added to every HTTP request as "Name: value", repeatable
    #[arg(long)]
    pub http_headers: Vec<String>,
    #[arg(long, default_value_t = 10_000)]
    pub http_timeout_milliseconds: u64,
    /// gRPC request as <service>/<method>[:message], repeatable
    #[arg(long)]
    pub grpc_requests: Vec<String>,
    /// Metadata added to every gRPC request as "Name: value", repeatable
    #[arg(long)]
    pub grpc_headers: Vec<String>,
    #[arg(long, default_value_t = 10_000)]
    pub grpc_timeout_milliseconds: u64,

    /// Expose liveness and readiness over HTTP
    #[arg(long)]
    pub server_probe_enabled: bool,
    #[arg(long, default_value_t = kindle_probe::server::DEFAULT_PORT)]
    pub server_probe_port: u16,
    #[arg(long, default_value = kindle_probe::DEFAULT_LIVENESS_PATH)]
    pub server_probe_liveness_path: String,
    #[arg(long, default_value = kindle_probe::DEFAULT_READINESS_PATH)]
    pub server_probe_readiness_path: String,

    /// Write liveness and readiness marker files
    #[arg(long, default_value_t = true, action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true")]
    pub file_probe_enabled: bool,
    #[arg(long, default_value = kindle_probe::file::DEFAULT_LIVENESS_FILE)]
    pub file_probe_liveness_path: String,
    #[arg(long, default_value = kindle_probe::file::DEFAULT_READINESS_FILE)]
    pub file_probe_readiness_path: String,

    /// Emit logs as JSON lines (command line only; logging starts before the config file is read)
    #[arg(long)]
    pub log_json: bool,
}

/// Everything the run needs, validated before any network activity.
#[derive(Debug, Clone)]
pub struct Plan {
    pub budget: TimeBudget,
    pub target: TargetOptions,
    pub requests: WarmupRequests,
    pub pool: PoolConfig,
}

impl Config {
    /// Apply the config file, if one was given.
    pub fn resolve(self) -> anyhow::Result<Self> {
        match self.config.clone() {
            Some(path) => self.with_file(&path),
            None => Ok(self),
        }
    }

    /// Overlay the keys present in the JSON file at `path`.
    pub fn with_file(self, path: &Path) -> anyhow::Result<Self> {
        info!(path = %path.display(), "reading config file");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let overlay: Value = serde_json::from_str(&content)
            .with_context(|| format!("unable to parse config file {}", path.display()))?;
        self.with_overlay(overlay)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Overlay the top-level keys of a JSON object.
    pub fn with_overlay(self, overlay: Value) -> anyhow::Result<Self> {
        let Value::Object(overlay) = overlay else {
            bail!("config must be a JSON object");
        };

        let config_path = self.config.clone();
        let mut merged = serde_json::to_value(&self)?;
        if let Value::Object(base) = &mut merged {
            base.extend(overlay);
        }

        let mut config: Config = serde_json::from_value(merged)?;
        config.config = config_path;
        Ok(config)
    }

    pub fn budget(&self) -> TimeBudget {
        TimeBudget::new(
            Duration::from_secs(self.max_duration_seconds),
            self.max_readiness_wait_seconds.map(Duration::from_secs),
            self.max_warmup_seconds.map(Duration::from_secs),
        )
    }

    pub fn readiness_port(&self) -> u16 {
        self.target_readiness_port.unwrap_or(self.target_http_port)
    }

    /// Validate every setting and parse the request templates.
    pub fn plan(&self) -> anyhow::Result<Plan> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.server_probe_enabled {
            self.probe_paths()
                .validate()
                .context("invalid server probe paths")?;
        }

        let budget = self.budget();
        let target = TargetOptions::new(
            &self.target_readiness_protocol,
            &self.target_readiness_http_path,
            &self.target_readiness_grpc_method,
            self.readiness_port(),
            budget.readiness_timeout(),
        )?;

        let compression: Compression = self
            .http_requests_compression
            .as_deref()
            .unwrap_or_default()
            .parse()?;
        let requests = WarmupRequests {
            http: HttpRequest::parse_all(&self.http_requests, compression)?,
            grpc: GrpcRequest::parse_all(&self.grpc_requests)?,
        };

        let pool = PoolConfig {
            concurrency: self.concurrency,
            delay: Duration::from_millis(self.request_delay_milliseconds),
            ramp_up: Duration::from_secs(self.ramp_up_interval_seconds),
        };

        Ok(Plan {
            budget,
            target,
            requests,
            pool,
        })
    }

    pub fn http_base_url(&self, port: u16) -> String {
        format!("{}:{}", self.target_http_host.trim_end_matches('/'), port)
    }

    pub fn grpc_address(&self, port: u16) -> String {
        format!("{}:{}", self.target_grpc_host, port)
    }

    pub fn http_headers(&self) -> kindle_core::Headers {
        parse_headers(&self.http_headers)
    }

    pub fn grpc_headers(&self) -> kindle_core::Headers {
        parse_headers(&self.grpc_headers)
    }

    pub fn probe_paths(&self) -> ProbePaths {
        ProbePaths {
            liveness: self.server_probe_liveness_path.clone(),
            readiness: self.server_probe_readiness_path.clone(),
        }
    }

    pub fn file_probe(&self) -> Option<FileProbe> {
        self.file_probe_enabled.then(|| {
            FileProbe::new(&self.file_probe_liveness_path, &self.file_probe_readiness_path)
        })
    }
}
