//! Layered configuration for Numbat.
//!
//! Configuration is built from layers, each overriding only the keys it
//! names:
//!
//! 1. Defaults, or the [`NumbatConfig::development`] / [`NumbatConfig::production`] presets
//! 2. TOML or JSON files and strings
//! 3. Environment variables of the form `PREFIX__SECTION__KEY`
//!
//! Unknown keys are rejected at every layer.
//!
//! # Example
//!
//! ```no_run
//! use numbat_config::ConfigLoader;
//!
//! # fn main() -> Result<(), numbat_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_production()
//!     .with_file("numbat.toml")?
//!     .with_env_prefix("NUMBAT")
//!     .load()?;
//! # Ok(())
//! # }
//! ```
//!
//! # File format
//!
//! ```toml
//! [server]
//! addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! max_body_size = 1048576
//! redirect_trailing_slash = true
//!
//! [logging]
//! level = "numbat=debug,hyper=warn"
//! format = "pretty"
//!
//! [rate_limit]
//! enabled = true
//! rate = 5.0
//! burst = 10
//!
//! [gzip]
//! enabled = true
//! min_length = 512
//! ```
//!
//! # Environment overrides
//!
//! - `NUMBAT__SERVER__ADDR=0.0.0.0:9000`
//! - `NUMBAT__LOGGING__LEVEL=debug`
//! - `NUMBAT__RATE_LIMIT__BURST=40`
//! - `NUMBAT__SERVER__MAX_CONNECTIONS=none`
//!
//! Values are parsed as the type of the key they replace.

mod config;
mod error;
mod loader;
mod schema;

pub use config::NumbatConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{GzipSection, LogFormat, LoggingSection, RateLimitSection, ServerSection};
