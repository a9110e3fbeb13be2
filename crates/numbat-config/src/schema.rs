//! Configuration section types.
//!
//! Every section fills missing keys from its defaults and rejects unknown
//! keys, so a typo in a file fails loudly instead of being ignored.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// HTTP server section.
///
/// ```
/// use numbat_config::ServerSection;
///
/// let server = ServerSection {
///     addr: "127.0.0.1:3000".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(server.shutdown_timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Bind address, e.g. `"0.0.0.0:8080"` or `":8080"`.
    pub addr: String,

    /// Graceful shutdown timeout in seconds.
    pub shutdown_timeout_secs: u64,

    /// Time allowed for the request head in seconds. `None` disables it.
    pub header_read_timeout_secs: Option<u64>,

    /// HTTP/1.1 keep-alive.
    pub keep_alive: bool,

    /// Largest request body collected, in bytes. Zero means 10 MiB.
    pub max_body_size: usize,

    /// Concurrent connection limit. `None` means unlimited.
    pub max_connections: Option<usize>,

    /// Redirect `/path/` to `/path`.
    pub redirect_trailing_slash: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            shutdown_timeout_secs: 30,
            header_read_timeout_secs: Some(5),
            keep_alive: true,
            max_body_size: 10 << 20,
            max_connections: None,
            redirect_trailing_slash: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Install a subscriber at all.
    pub enabled: bool,

    /// `EnvFilter` directive, e.g. `"info"` or `"numbat=debug,hyper=warn"`.
    pub level: String,

    /// Output format.
    pub format: LogFormat,

    /// Include the event target.
    pub include_target: bool,

    /// Include source file and line.
    pub file_line_info: bool,

    /// Include thread ids.
    pub thread_ids: bool,

    /// Write to `directory/access.log` instead of stdout.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Json,
            include_target: true,
            file_line_info: false,
            thread_ids: false,
            directory: None,
        }
    }
}

/// Rate limiting section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitSection {
    /// Whether the application should install the limiter.
    pub enabled: bool,

    /// Sustained requests per second per client.
    pub rate: f64,

    /// Bucket capacity.
    pub burst: u32,

    /// Seconds between sweeps of idle buckets.
    pub cleanup_interval_secs: u64,

    /// Seconds of inactivity after which a bucket is dropped.
    pub stale_after_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: 10.0,
            burst: 20,
            cleanup_interval_secs: 60,
            stale_after_secs: 300,
        }
    }
}

/// Gzip section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GzipSection {
    /// Whether the application should install compression.
    pub enabled: bool,

    /// Compression level from 0 to 9.
    pub level: u32,

    /// Bodies shorter than this are sent as is.
    pub min_length: usize,
}

impl Default for GzipSection {
    fn default() -> Self {
        Self {
            enabled: false,
            level: 6,
            min_length: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_section_keeps_defaults() {
        let server: ServerSection = toml::from_str(r#"addr = "127.0.0.1:9000""#).unwrap();
        assert_eq!(server.addr, "127.0.0.1:9000");
        assert_eq!(server.shutdown_timeout_secs, 30);
        assert!(server.keep_alive);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<GzipSection, _> = toml::from_str("levle = 3");
        assert!(result.is_err());
    }

    #[test]
    fn test_log_format_names() {
        let logging: LoggingSection = serde_json::from_str(r#"{"format":"pretty"}"#).unwrap();
        assert_eq!(logging.format, LogFormat::Pretty);
        assert!(serde_json::from_str::<LoggingSection>(r#"{"format":"xml"}"#).is_err());
    }
}
