//! Structured logging for Numbat.
//!
//! Installs a `tracing` subscriber that prints JSON lines or pretty
//! output, filtered by an `EnvFilter` directive, to stdout or to
//! `access.log` in a configured directory.

mod error;
mod logging;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig, LogGuard, LOG_FILE_NAME};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
