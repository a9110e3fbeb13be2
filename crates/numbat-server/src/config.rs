//! Server configuration types.
//!
//! # Example
//!
//! ```rust
//! use numbat_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .addr("127.0.0.1:3000")
//!     .shutdown_timeout(Duration::from_secs(10))
//!     .build();
//!
//! assert_eq!(config.addr(), "127.0.0.1:3000");
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use numbat_config::ServerSection;
use numbat_core::DEFAULT_MAX_BODY_SIZE;

/// Default bind address.
pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default time allowed for a client to send the request head, in seconds.
pub const DEFAULT_HEADER_READ_TIMEOUT_SECS: u64 = 5;

/// Server configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    addr: String,
    shutdown_timeout: Duration,
    header_read_timeout: Option<Duration>,
    keep_alive: bool,
    max_body_size: usize,
    max_connections: Option<usize>,
}

impl ServerConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// The bind address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Parses the bind address.
    ///
    /// A bare `:port` binds every interface, so `":8080"` is accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        match self.addr.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}").parse(),
            None => self.addr.parse(),
        }
    }

    /// How long shutdown waits for in-flight connections.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// How long a client may take to send the request head.
    #[must_use]
    pub fn header_read_timeout(&self) -> Option<Duration> {
        self.header_read_timeout
    }

    /// Whether HTTP/1.1 keep-alive is enabled.
    #[must_use]
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Largest request body the server will collect.
    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Maximum concurrent connections, if limited.
    #[must_use]
    pub fn max_connections(&self) -> Option<usize> {
        self.max_connections
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&ServerSection> for ServerConfig {
    /// Builds a server configuration from the `[server]` section.
    ///
    /// `redirect_trailing_slash` belongs to the router and is not carried.
    fn from(section: &ServerSection) -> Self {
        Self::builder()
            .addr(section.addr.clone())
            .shutdown_timeout(Duration::from_secs(section.shutdown_timeout_secs))
            .header_read_timeout(section.header_read_timeout_secs.map(Duration::from_secs))
            .keep_alive(section.keep_alive)
            .max_body_size(section.max_body_size)
            .max_connections(section.max_connections)
            .build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    addr: String,
    shutdown_timeout: Duration,
    header_read_timeout: Option<Duration>,
    keep_alive: bool,
    max_body_size: usize,
    max_connections: Option<usize>,
}

impl ServerConfigBuilder {
    /// Creates a builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            header_read_timeout: Some(Duration::from_secs(DEFAULT_HEADER_READ_TIMEOUT_SECS)),
            keep_alive: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            max_connections: None,
        }
    }

    /// Sets the bind address, e.g. `"127.0.0.1:3000"` or `":8080"`.
    #[must_use]
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Sets the graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the request head timeout. `None` disables it.
    #[must_use]
    pub fn header_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.header_read_timeout = timeout;
        self
    }

    /// Enables or disables keep-alive.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    /// Sets the request body limit. Zero restores the default.
    #[must_use]
    pub fn max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = if limit == 0 {
            DEFAULT_MAX_BODY_SIZE
        } else {
            limit
        };
        self
    }

    /// Limits concurrent connections. Connections over the limit are
    /// closed right after accept.
    #[must_use]
    pub fn max_connections(mut self, max: Option<usize>) -> Self {
        self.max_connections = max;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            addr: self.addr,
            shutdown_timeout: self.shutdown_timeout,
            header_read_timeout: self.header_read_timeout,
            keep_alive: self.keep_alive,
            max_body_size: self.max_body_size,
            max_connections: self.max_connections,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), DEFAULT_ADDR);
        assert_eq!(
            config.shutdown_timeout(),
            Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS)
        );
        assert_eq!(config.header_read_timeout(), Some(Duration::from_secs(5)));
        assert!(config.keep_alive());
        assert_eq!(config.max_body_size(), DEFAULT_MAX_BODY_SIZE);
        assert!(config.max_connections().is_none());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ServerConfig::builder()
            .addr("127.0.0.1:9000")
            .shutdown_timeout(Duration::from_secs(3))
            .header_read_timeout(None)
            .keep_alive(false)
            .max_body_size(1024)
            .max_connections(Some(8))
            .build();

        assert_eq!(config.addr(), "127.0.0.1:9000");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(3));
        assert!(config.header_read_timeout().is_none());
        assert!(!config.keep_alive());
        assert_eq!(config.max_body_size(), 1024);
        assert_eq!(config.max_connections(), Some(8));
    }

    #[test]
    fn test_zero_body_size_restores_default() {
        let config = ServerConfig::builder().max_body_size(0).build();
        assert_eq!(config.max_body_size(), DEFAULT_MAX_BODY_SIZE);
    }

    #[test]
    fn test_socket_addr_parsing() {
        let config = ServerConfig::builder().addr("127.0.0.1:8080").build();
        assert_eq!(config.socket_addr().unwrap().port(), 8080);

        let config = ServerConfig::builder().addr(":9090").build();
        let addr = config.socket_addr().unwrap();
        assert!(addr.ip().is_unspecified());
        assert_eq!(addr.port(), 9090);

        let config = ServerConfig::builder().addr("not an address").build();
        assert!(config.socket_addr().is_err());
    }

    #[test]
    fn test_from_server_section() {
        let section = ServerSection {
            addr: ":7000".to_string(),
            shutdown_timeout_secs: 2,
            header_read_timeout_secs: None,
            keep_alive: false,
            max_body_size: 0,
            max_connections: Some(4),
            redirect_trailing_slash: true,
        };
        let config = ServerConfig::from(&section);
        assert_eq!(config.addr(), ":7000");
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(2));
        assert!(config.header_read_timeout().is_none());
        assert!(!config.keep_alive());
        assert_eq!(config.max_body_size(), DEFAULT_MAX_BODY_SIZE);
        assert_eq!(config.max_connections(), Some(4));
    }
}
