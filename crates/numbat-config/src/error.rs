//! Configuration errors.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required file does not exist.
    #[error("no configuration file at {}", path.display())]
    NotFound {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// A file exists but could not be read.
    #[error("cannot read {}", path.display())]
    Read {
        /// The file being read.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: io::Error,
    },

    /// Malformed TOML, or TOML that does not fit the schema.
    #[error("bad TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON, or JSON that does not fit the schema.
    #[error("bad JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Neither `toml` nor `json`.
    #[error("unsupported configuration format '{0}'")]
    UnsupportedFormat(String),

    /// A value parsed but is out of range.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// Dotted key, e.g. `server.addr`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A `.env` file exists but is malformed.
    #[error("cannot load .env: {0}")]
    Dotenv(String),

    /// An environment override names an unknown key or has the wrong type.
    #[error("bad environment override {var}: {reason}")]
    Env {
        /// The variable name.
        var: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_value(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn env(var: &str, reason: impl Into<String>) -> Self {
        Self::Env {
            var: var.to_string(),
            reason: reason.into(),
        }
    }
}
