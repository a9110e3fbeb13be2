//! The root configuration type.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::schema::{GzipSection, LogFormat, LoggingSection, RateLimitSection, ServerSection};

/// Complete Numbat configuration.
///
/// ```toml
/// [server]
/// addr = "0.0.0.0:8080"
/// shutdown_timeout_secs = 30
///
/// [logging]
/// level = "info"
/// format = "json"
///
/// [rate_limit]
/// enabled = true
/// rate = 5.0
/// burst = 10
///
/// [gzip]
/// enabled = true
/// level = 6
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NumbatConfig {
    /// HTTP server settings.
    pub server: ServerSection,
    /// Logging settings.
    pub logging: LoggingSection,
    /// Rate limiter settings.
    pub rate_limit: RateLimitSection,
    /// Compression settings.
    pub gzip: GzipSection,
}

impl NumbatConfig {
    /// Local development preset: pretty debug logs on localhost.
    #[must_use]
    pub fn development() -> Self {
        Self {
            server: ServerSection {
                addr: "127.0.0.1:8080".to_string(),
                shutdown_timeout_secs: 5,
                ..ServerSection::default()
            },
            logging: LoggingSection {
                level: "debug".to_string(),
                format: LogFormat::Pretty,
                file_line_info: true,
                ..LoggingSection::default()
            },
            ..Self::default()
        }
    }

    /// Production preset: JSON logs, compression and rate limiting on.
    #[must_use]
    pub fn production() -> Self {
        Self {
            logging: LoggingSection {
                level: "info".to_string(),
                format: LogFormat::Json,
                ..LoggingSection::default()
            },
            rate_limit: RateLimitSection {
                enabled: true,
                ..RateLimitSection::default()
            },
            gzip: GzipSection {
                enabled: true,
                ..GzipSection::default()
            },
            ..Self::default()
        }
    }

    /// Checks values the type system cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let addr = self.server.addr.as_str();
        let parsed = match addr.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}").parse::<SocketAddr>(),
            None => addr.parse::<SocketAddr>(),
        };
        if let Err(err) = parsed {
            return Err(ConfigError::invalid_value("server.addr", format!("'{addr}': {err}")));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value("logging.level", "must not be empty"));
        }

        let rate = self.rate_limit.rate;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ConfigError::invalid_value(
                "rate_limit.rate",
                format!("must be a positive number, got {rate}"),
            ));
        }
        if self.rate_limit.burst == 0 {
            return Err(ConfigError::invalid_value("rate_limit.burst", "must be at least 1"));
        }

        if self.gzip.level > 9 {
            return Err(ConfigError::invalid_value(
                "gzip.level",
                format!("must be between 0 and 9, got {}", self.gzip.level),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        NumbatConfig::default().validate().unwrap();
        NumbatConfig::development().validate().unwrap();
        NumbatConfig::production().validate().unwrap();
    }

    #[test]
    fn test_presets() {
        let dev = NumbatConfig::development();
        assert_eq!(dev.logging.format, LogFormat::Pretty);
        assert_eq!(dev.logging.level, "debug");
        assert!(!dev.rate_limit.enabled);

        let prod = NumbatConfig::production();
        assert_eq!(prod.logging.format, LogFormat::Json);
        assert!(prod.rate_limit.enabled);
        assert!(prod.gzip.enabled);
    }

    #[test]
    fn test_port_only_address_is_valid() {
        let mut config = NumbatConfig::default();
        config.server.addr = ":9000".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_values() {
        let mut config = NumbatConfig::default();
        config.server.addr = "nowhere".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("server.addr"));

        let mut config = NumbatConfig::default();
        config.rate_limit.rate = 0.0;
        assert!(config.validate().unwrap_err().to_string().contains("rate_limit.rate"));

        let mut config = NumbatConfig::default();
        config.rate_limit.rate = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = NumbatConfig::default();
        config.gzip.level = 12;
        assert!(config.validate().unwrap_err().to_string().contains("gzip.level"));
    }
}
