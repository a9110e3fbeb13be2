//! Log subscriber setup.
//!
//! ```rust,no_run
//! use numbat_telemetry::{init_logging, LogConfig};
//!
//! # fn main() -> Result<(), numbat_telemetry::TelemetryError> {
//! let _guard = init_logging(&LogConfig::development())?;
//! tracing::info!(addr = "127.0.0.1:8080", "listening");
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use numbat_config::{LogFormat, LoggingSection};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Name of the file written under [`LogConfig::directory`].
pub const LOG_FILE_NAME: &str = "access.log";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether to install a subscriber.
    pub enabled: bool,

    /// `EnvFilter` directive, e.g. `"info"` or `"numbat=debug,hyper=warn"`.
    pub level: String,

    /// JSON lines when true, pretty output otherwise.
    pub json_format: bool,

    /// Whether to include the target (module path).
    pub include_target: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include thread IDs.
    pub thread_ids: bool,

    /// Write to `directory/access.log` instead of stdout.
    pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            include_target: true,
            file_line_info: false,
            thread_ids: false,
            directory: None,
        }
    }
}

impl LogConfig {
    /// Human-readable debug output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            file_line_info: true,
            ..Self::default()
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }
}

impl From<&LoggingSection> for LogConfig {
    fn from(section: &LoggingSection) -> Self {
        Self {
            enabled: section.enabled,
            level: section.level.clone(),
            json_format: section.format == LogFormat::Json,
            include_target: section.include_target,
            file_line_info: section.file_line_info,
            thread_ids: section.thread_ids,
            directory: section.directory.clone(),
        }
    }
}

/// Keeps the background log writer alive.
///
/// Buffered lines are flushed when this is dropped, so hold it for the
/// lifetime of the program.
#[derive(Debug, Default)]
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
}

/// Parses a filter directive.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter).map_err(|e| TelemetryError::InvalidFilter {
        filter: filter.to_string(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber.
///
/// Does nothing when `config.enabled` is false.
///
/// # Errors
///
/// - [`TelemetryError::InvalidFilter`] if `level` does not parse
/// - [`TelemetryError::LogFile`] if the log file cannot be opened
/// - [`TelemetryError::AlreadyInitialized`] if a subscriber is already set
pub fn init_logging(config: &LogConfig) -> TelemetryResult<LogGuard> {
    if !config.enabled {
        return Ok(LogGuard::default());
    }

    let filter = create_env_filter(&config.level)?;

    let (writer, worker) = match &config.directory {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(LOG_FILE_NAME)
                .build(dir)
                .map_err(|e| TelemetryError::LogFile(format!("{}: {e}", dir.display())))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    // Files get no ANSI escapes.
    let ansi = worker.is_none();
    let fmt_layer = if config.json_format {
        tracing_subscriber::fmt::layer()
            .json()
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_writer(writer)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(ansi)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_thread_ids(config.thread_ids)
            .with_target(config.include_target)
            .with_writer(writer)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    Ok(LogGuard { _worker: worker })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets() {
        let dev = LogConfig::development();
        assert!(!dev.json_format);
        assert!(dev.file_line_info);
        assert_eq!(dev.level, "debug");

        let prod = LogConfig::production();
        assert!(prod.json_format);
        assert!(!prod.file_line_info);
        assert_eq!(prod.level, "info");
        assert!(prod.directory.is_none());
    }

    #[test]
    fn test_from_logging_section() {
        let section = LoggingSection {
            level: "numbat=trace".to_string(),
            format: LogFormat::Pretty,
            thread_ids: true,
            directory: Some(PathBuf::from("/tmp/logs")),
            ..LoggingSection::default()
        };
        let config = LogConfig::from(&section);
        assert_eq!(config.level, "numbat=trace");
        assert!(!config.json_format);
        assert!(config.thread_ids);
        assert_eq!(config.directory, Some(PathBuf::from("/tmp/logs")));
    }

    #[test]
    fn test_create_env_filter() {
        assert!(create_env_filter("info,numbat::access=debug").is_ok());
        let err = create_env_filter("numbat=loudest").unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidFilter { .. }));
    }

    #[test]
    fn test_disabled_logging_is_a_no_op() {
        let config = LogConfig {
            enabled: false,
            level: "numbat=loudest".to_string(),
            ..LogConfig::default()
        };
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_invalid_filter_is_reported_before_install() {
        let config = LogConfig {
            level: "numbat=loudest".to_string(),
            ..LogConfig::default()
        };
        assert!(matches!(
            init_logging(&config),
            Err(TelemetryError::InvalidFilter { .. })
        ));
    }
}
