//! kindle-core: request templates, placeholders and time budgets.
//!
//! Everything in this crate is pure: parsing and validation happen once at
//! start-up, before any network activity, and fail with a [`ConfigError`]
//! that names the offending input.

pub mod budget;
pub mod error;
pub mod headers;
pub mod placeholders;
pub mod request;
pub mod target;

pub use budget::TimeBudget;
pub use error::{ConfigError, ConfigResult};
pub use headers::{Headers, parse_headers};
pub use placeholders::interpolate;
pub use request::{Compression, GrpcRequest, HttpRequest};
pub use target::{ReadinessProtocol, TargetOptions};
