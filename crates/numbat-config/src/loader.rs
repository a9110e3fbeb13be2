//! Layered configuration loading.

use std::env;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::config::NumbatConfig;
use crate::error::ConfigError;

/// Configuration loader with layered approach.
///
/// Layers are applied in order, later layers overriding earlier ones:
/// 1. Defaults (or a development/production preset)
/// 2. Files and strings (TOML or JSON)
/// 3. Environment variables, applied by [`load`](Self::load)
///
/// A file layer only overrides the keys it names; everything else keeps the
/// value from the layers below.
///
/// ```no_run
/// use numbat_config::ConfigLoader;
///
/// # fn main() -> Result<(), numbat_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("numbat.toml")?
///     .with_dotenv()?
///     .with_env_prefix("NUMBAT")
///     .load()?;
/// println!("listening on {}", config.server.addr);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: NumbatConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader starting from the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: NumbatConfig::default(),
            env_prefix: None,
        }
    }

    /// Resets to the defaults, dropping earlier layers.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = NumbatConfig::default();
        self
    }

    /// Starts from [`NumbatConfig::development`].
    ///
    /// ```
    /// use numbat_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = NumbatConfig::development();
        self
    }

    /// Starts from [`NumbatConfig::production`].
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = NumbatConfig::production();
        self
    }

    /// Layers a file over the current configuration.
    ///
    /// The format is chosen by extension: `.toml` or `.json`.
    ///
    /// # Errors
    ///
    /// Fails if the file is missing, unreadable, malformed, has an
    /// unsupported extension or contains unknown keys.
    pub fn with_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::not_found(path));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::read(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;
        self.with_string(&content, format)
    }

    /// Layers a file if it exists.
    ///
    /// # Errors
    ///
    /// Fails only if the file exists and cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Layers configuration text in `format` (`"toml"` or `"json"`).
    ///
    /// ```
    /// use numbat_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\naddr = \"127.0.0.1:3000\"", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    /// assert_eq!(config.server.addr, "127.0.0.1:3000");
    /// assert_eq!(config.server.shutdown_timeout_secs, 30);
    /// ```
    ///
    /// # Errors
    ///
    /// Fails on malformed text, unknown keys or an unsupported format.
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let layer: Value = match format.to_ascii_lowercase().as_str() {
            "toml" => {
                // Parse into the typed schema first so unknown keys and type
                // errors are reported as TOML errors with positions.
                toml::from_str::<NumbatConfig>(content)?;
                serde_json::to_value(toml::from_str::<toml::Value>(content)?)?
            }
            "json" => {
                serde_json::from_str::<NumbatConfig>(content)?;
                serde_json::from_str(content)?
            }
            other => return Err(ConfigError::UnsupportedFormat(other.to_string())),
        };
        self.merge(layer)?;
        Ok(self)
    }

    /// Loads a `.env` file from the current directory or its parents into
    /// the process environment. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Fails if a `.env` file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(err) if err.not_found() => Ok(self),
            Err(err) => Err(ConfigError::Dotenv(err.to_string())),
        }
    }

    /// Enables environment overrides of the form `PREFIX__SECTION__KEY`,
    /// e.g. `NUMBAT__SERVER__ADDR=0.0.0.0:9000`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Applies environment overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Fails on an unknown or unparsable environment key, or if validation
    /// fails.
    pub fn load(mut self) -> Result<NumbatConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env(&prefix, env::vars())?;
        }
        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without environment overrides or
    /// validation.
    #[must_use]
    pub fn load_unvalidated(self) -> NumbatConfig {
        self.config
    }

    fn merge(&mut self, layer: Value) -> Result<(), ConfigError> {
        let mut base = serde_json::to_value(&self.config)?;
        merge_values(&mut base, layer);
        self.config = serde_json::from_value(base)?;
        Ok(())
    }

    fn apply_env<I>(&mut self, prefix: &str, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let marker = format!("{prefix}__");
        let mut base = serde_json::to_value(&self.config)?;

        for (key, raw) in vars {
            let Some(rest) = key.strip_prefix(&marker) else {
                continue;
            };
            let path: Vec<String> = rest.split("__").map(str::to_ascii_lowercase).collect();
            let [section, field] = path.as_slice() else {
                return Err(ConfigError::env(&key, "expected PREFIX__SECTION__KEY"));
            };
            let slot = base
                .get_mut(section.as_str())
                .and_then(|s| s.get_mut(field.as_str()))
                .ok_or_else(|| ConfigError::env(&key, "unknown configuration key"))?;
            *slot = parse_env_value(slot, &raw)
                .map_err(|reason| ConfigError::env(&key, reason))?;
        }

        self.config = serde_json::from_value(base)?;
        Ok(())
    }
}

/// Deep-merges `layer` into `base`. Objects merge key by key; any other
/// value replaces.
fn merge_values(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

/// Parses `raw` into the JSON type of the value it replaces.
fn parse_env_value(current: &Value, raw: &str) -> Result<Value, &'static str> {
    let raw = raw.trim();
    let unset = raw.is_empty() || raw.eq_ignore_ascii_case("none");
    match current {
        // Optional numbers are cleared with "none"; required ones then fail
        // to deserialize.
        Value::Number(_) | Value::Null if unset => Ok(Value::Null),
        Value::Bool(_) => parse_bool(raw).map(Value::Bool).ok_or("expected boolean"),
        Value::Number(n) if n.is_f64() => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or("expected number"),
        Value::Number(_) => raw
            .parse::<u64>()
            .map(Value::from)
            .map_err(|_| "expected non-negative integer"),
        Value::Null => Ok(if let Ok(n) = raw.parse::<u64>() {
            Value::from(n)
        } else {
            Value::String(raw.to_string())
        }),
        Value::String(_) => Ok(Value::String(raw.to_string())),
        Value::Array(_) | Value::Object(_) => Err("cannot override a table"),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
