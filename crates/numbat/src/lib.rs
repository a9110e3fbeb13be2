//! # Numbat
//!
//! An HTTP request dispatcher built from a segment-trie router, an ordered
//! middleware chain and a per-request context.
//!
//! - Static, `:param` and `*wildcard` routes with greedy, non-backtracking
//!   matching
//! - Global, group and per-route middleware
//! - Built-in logging, panic recovery, timeouts, rate limiting, gzip, CORS,
//!   security headers, body limits and JWT authentication
//! - Static file serving with ranges and conditional requests
//! - Graceful shutdown
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use numbat::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ServerError> {
//!     let router = Router::new();
//!     router.use_middleware(Recover).use_middleware(Logger::new());
//!     router.get(
//!         "/hello/:name",
//!         handler_fn(|ctx| {
//!             Box::pin(async move {
//!                 let name = ctx.param("name").unwrap_or("world").to_string();
//!                 ctx.text(StatusCode::OK, format!("hello, {name}"));
//!             })
//!         }),
//!     );
//!
//!     Server::new(ServerConfig::default(), Arc::new(router)).run().await
//! }
//! ```

pub use numbat_config as config;
pub use numbat_core as core;
pub use numbat_middleware as middleware;
pub use numbat_router as router;
pub use numbat_server as server;
pub use numbat_telemetry as telemetry;

use numbat_config::NumbatConfig;
use numbat_middleware::stages::{Logger, RateLimit, RateLimitConfig, Recover};
use numbat_server::Router;

/// Applies the router-level parts of a loaded configuration.
///
/// Installs `Recover` and `Logger`, then `RateLimit` and `Gzip` when their
/// sections are enabled, and sets the body limit and trailing-slash
/// redirects. Call it before registering application middleware so these
/// run outermost.
///
/// ```rust
/// use numbat::{config::NumbatConfig, configure_router, server::Router};
///
/// let router = Router::new();
/// configure_router(&router, &NumbatConfig::production());
/// ```
pub fn configure_router(router: &Router, config: &NumbatConfig) {
    router.use_middleware(Recover).use_middleware(Logger::new());

    if config.rate_limit.enabled {
        router.use_middleware(RateLimit::new(RateLimitConfig::from(&config.rate_limit)));
    }

    if config.gzip.enabled {
        install_gzip(router, &config.gzip);
    }

    router
        .max_body_size(config.server.max_body_size)
        .redirect_trailing_slash(config.server.redirect_trailing_slash);
}

#[cfg(feature = "compression")]
fn install_gzip(router: &Router, section: &numbat_config::GzipSection) {
    use numbat_middleware::stages::{Gzip, GzipConfig};
    router.use_middleware(Gzip::new(GzipConfig::from(section)));
}

#[cfg(not(feature = "compression"))]
fn install_gzip(_router: &Router, _section: &numbat_config::GzipSection) {
    tracing::warn!("gzip is enabled in configuration but the compression feature is off");
}

/// Common imports.
///
/// ```rust
/// use numbat::prelude::*;
/// ```
pub mod prelude {
    pub use http::{Method, StatusCode};

    pub use numbat_config::{ConfigLoader, NumbatConfig};
    pub use numbat_core::{
        handler_fn, BindError, BoxFuture, Context, ErrorResponse, Handler, Params, RequestId,
    };
    pub use numbat_middleware::stages::{
        BodyLimit, Cors, CorsConfig, Logger, RateLimit, RateLimitConfig, Recover, SecurityHeaders,
        SecurityHeadersConfig, Timeout,
    };
    #[cfg(feature = "compression")]
    pub use numbat_middleware::stages::{CompressionLevel, Gzip, GzipConfig};
    #[cfg(feature = "jwt")]
    pub use numbat_middleware::stages::{JwtAuth, JwtClaims, JwtConfig};
    pub use numbat_middleware::{from_fn, Chain, Middleware, Next};
    pub use numbat_server::{
        Group, Router, Server, ServerConfig, ServerError, ShutdownSignal, StaticFiles,
    };
    pub use numbat_telemetry::{init_logging, LogConfig};

    pub use crate::configure_router;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use numbat_test::TestClient;

    fn hello() -> impl Handler {
        handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::OK, "hello") }))
    }

    #[tokio::test]
    async fn test_configure_router_applies_limits() {
        let mut config = NumbatConfig::default();
        config.server.redirect_trailing_slash = true;
        config.rate_limit.enabled = true;
        config.rate_limit.rate = 1.0;
        config.rate_limit.burst = 1;

        let router = Router::new();
        configure_router(&router, &config);
        router.get("/hello", hello());

        let client = TestClient::new(router);
        client
            .get("/hello/")
            .send()
            .await
            .assert_status(StatusCode::MOVED_PERMANENTLY)
            .assert_header("location", "/hello");
        client
            .get("/hello")
            .send()
            .await
            .assert_status(StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_configure_router_defaults() {
        let router = Router::new();
        configure_router(&router, &NumbatConfig::default());
        router.get("/hello", hello());

        let client = TestClient::new(router);
        let response = client.get("/hello").send().await;
        response.assert_status(StatusCode::OK).assert_body_eq("hello");
        assert!(response.header_str("x-request-id").is_some());
        client
            .get("/hello/")
            .send()
            .await
            .assert_status(StatusCode::OK)
            .assert_no_header("location")
            .assert_body_eq("hello");
    }
}
