//! CORS (Cross-Origin Resource Sharing) middleware.
//!
//! Requests without an `Origin` header, or from an origin that is not
//! allowed, pass through untouched. Preflight requests (`OPTIONS` with
//! `Access-Control-Request-Method`) are answered with `204 No Content`
//! without reaching the handler. Other cross-origin requests get the
//! allow-origin, credentials and expose headers before the handler runs.
//!
//! ## Example
//!
//! ```rust
//! use numbat_middleware::stages::{Cors, CorsConfig};
//!
//! let cors = Cors::new(
//!     CorsConfig::new()
//!         .allow_origins(["https://app.example.com"])
//!         .allow_credentials(true)
//!         .max_age(3600),
//! );
//! # let _ = cors;
//! ```

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE,
    ACCESS_CONTROL_REQUEST_METHOD, ORIGIN, VARY,
};
use http::{HeaderValue, Method, StatusCode};
use numbat_core::{BoxFuture, Context};

use crate::{Middleware, Next};

const PREFLIGHT_VARY: &str = "Origin, Access-Control-Request-Method, Access-Control-Request-Headers";

/// CORS settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    allow_origins: Vec<String>,
    allow_methods: Vec<String>,
    allow_headers: Vec<String>,
    expose_headers: Vec<String>,
    max_age: u64,
    allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_methods: ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"]
                .map(String::from)
                .to_vec(),
            allow_headers: [
                "Origin",
                "Content-Type",
                "Accept",
                "Authorization",
                "X-Request-Id",
            ]
            .map(String::from)
            .to_vec(),
            expose_headers: Vec::new(),
            max_age: 86_400,
            allow_credentials: false,
        }
    }
}

impl CorsConfig {
    /// Creates the default configuration: any origin, common methods and
    /// headers, one day preflight cache, no credentials.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allowed origins. `["*"]` allows any origin.
    #[must_use]
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Methods advertised in preflight responses.
    #[must_use]
    pub fn allow_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    /// Request headers advertised in preflight responses.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Response headers the browser may expose to scripts.
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expose_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Preflight cache duration in seconds. Zero omits the header.
    #[must_use]
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = seconds;
        self
    }

    /// Allows credentials. The request origin is then reflected instead of
    /// `*`.
    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }
}

/// CORS middleware. Header values are joined once at construction.
#[derive(Debug, Clone)]
pub struct Cors {
    allow_origins: Vec<String>,
    allow_all: bool,
    allow_credentials: bool,
    allow_methods: Option<HeaderValue>,
    allow_headers: Option<HeaderValue>,
    expose_headers: Option<HeaderValue>,
    max_age: Option<HeaderValue>,
}

impl Cors {
    /// Creates the middleware.
    #[must_use]
    pub fn new(config: CorsConfig) -> Self {
        let allow_all = config.allow_origins.len() == 1 && config.allow_origins[0] == "*";
        Self {
            allow_all,
            allow_credentials: config.allow_credentials,
            allow_methods: joined(&config.allow_methods),
            allow_headers: joined(&config.allow_headers),
            expose_headers: joined(&config.expose_headers),
            max_age: (config.max_age > 0).then(|| HeaderValue::from(config.max_age)),
            allow_origins: config.allow_origins,
        }
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        self.allow_all || self.allow_origins.iter().any(|a| a == "*" || a == origin)
    }
}

impl Default for Cors {
    fn default() -> Self {
        Self::new(CorsConfig::default())
    }
}

fn joined(values: &[String]) -> Option<HeaderValue> {
    if values.is_empty() {
        return None;
    }
    let value = values.join(", ");
    match HeaderValue::from_str(&value) {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(value, "invalid CORS header value ignored");
            None
        }
    }
}

impl Middleware for Cors {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let origin = match ctx.headers().get(ORIGIN) {
                Some(origin) if !origin.is_empty() => origin.clone(),
                _ => return next.run(ctx).await,
            };
            let allowed = origin.to_str().is_ok_and(|o| self.origin_allowed(o));
            if !allowed {
                return next.run(ctx).await;
            }

            let allow_origin = if self.allow_credentials || !self.allow_all {
                origin
            } else {
                HeaderValue::from_static("*")
            };

            let preflight = *ctx.method() == Method::OPTIONS
                && ctx
                    .headers()
                    .get(ACCESS_CONTROL_REQUEST_METHOD)
                    .is_some_and(|m| !m.is_empty());

            let headers = ctx.response_headers_mut();
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow_origin);
            if self.allow_credentials {
                headers.insert(
                    ACCESS_CONTROL_ALLOW_CREDENTIALS,
                    HeaderValue::from_static("true"),
                );
            }

            if preflight {
                if let Some(methods) = &self.allow_methods {
                    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, methods.clone());
                }
                if let Some(allow) = &self.allow_headers {
                    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, allow.clone());
                }
                if let Some(max_age) = &self.max_age {
                    headers.insert(ACCESS_CONTROL_MAX_AGE, max_age.clone());
                }
                headers.insert(VARY, HeaderValue::from_static(PREFLIGHT_VARY));
                ctx.status(StatusCode::NO_CONTENT);
                return;
            }

            if let Some(expose) = &self.expose_headers {
                headers.insert(ACCESS_CONTROL_EXPOSE_HEADERS, expose.clone());
            }
            headers.append(VARY, HeaderValue::from_static("Origin"));
            next.run(ctx).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{request, run_one};
    use http::Request;
    use numbat_core::handler_fn;

    fn ok() -> impl numbat_core::Handler {
        handler_fn(|ctx| Box::pin(async move { ctx.text(StatusCode::OK, "ok") }))
    }

    async fn run(cors: Cors, builder: http::request::Builder) -> Context {
        let mut ctx = request(builder, b"");
        run_one(cors, ok(), &mut ctx).await;
        ctx
    }

    #[tokio::test]
    async fn test_no_origin_passes_through() {
        let ctx = run(Cors::default(), Request::get("/")).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::OK));
        assert!(ctx.response_headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert!(ctx.response_headers().get(VARY).is_none());
    }

    #[tokio::test]
    async fn test_wildcard_origin() {
        let ctx = run(
            Cors::default(),
            Request::get("/").header(ORIGIN, "https://a.example"),
        )
        .await;
        let h = ctx.response_headers();
        assert_eq!(h[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(h[VARY], "Origin");
        assert!(h.get(ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
        assert_eq!(ctx.status_code(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_credentials_reflect_origin() {
        let cors = Cors::new(CorsConfig::new().allow_credentials(true));
        let ctx = run(cors, Request::get("/").header(ORIGIN, "https://a.example")).await;
        let h = ctx.response_headers();
        assert_eq!(h[ACCESS_CONTROL_ALLOW_ORIGIN], "https://a.example");
        assert_eq!(h[ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn test_disallowed_origin_untouched() {
        let cors = Cors::new(CorsConfig::new().allow_origins(["https://good.example"]));
        let ctx = run(cors, Request::get("/").header(ORIGIN, "https://evil.example")).await;
        assert!(ctx.response_headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert_eq!(ctx.status_code(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_listed_origin_is_reflected() {
        let cors = Cors::new(
            CorsConfig::new()
                .allow_origins(["https://good.example"])
                .expose_headers(["X-Total", "X-Page"]),
        );
        let ctx = run(cors, Request::get("/").header(ORIGIN, "https://good.example")).await;
        let h = ctx.response_headers();
        assert_eq!(h[ACCESS_CONTROL_ALLOW_ORIGIN], "https://good.example");
        assert_eq!(h[ACCESS_CONTROL_EXPOSE_HEADERS], "X-Total, X-Page");
    }

    #[tokio::test]
    async fn test_preflight_short_circuits() {
        let ctx = run(
            Cors::default(),
            Request::options("/items")
                .header(ORIGIN, "https://a.example")
                .header(ACCESS_CONTROL_REQUEST_METHOD, "PUT"),
        )
        .await;
        assert_eq!(ctx.status_code(), Some(StatusCode::NO_CONTENT));
        let h = ctx.response_headers();
        assert_eq!(h[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(
            h[ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS"
        );
        assert_eq!(
            h[ACCESS_CONTROL_ALLOW_HEADERS],
            "Origin, Content-Type, Accept, Authorization, X-Request-Id"
        );
        assert_eq!(h[ACCESS_CONTROL_MAX_AGE], "86400");
        assert_eq!(h[VARY], PREFLIGHT_VARY);
    }

    #[tokio::test]
    async fn test_preflight_zero_max_age_omitted() {
        let cors = Cors::new(CorsConfig::new().max_age(0));
        let ctx = run(
            cors,
            Request::options("/")
                .header(ORIGIN, "https://a.example")
                .header(ACCESS_CONTROL_REQUEST_METHOD, "GET"),
        )
        .await;
        assert!(ctx.response_headers().get(ACCESS_CONTROL_MAX_AGE).is_none());
    }

    #[tokio::test]
    async fn test_plain_options_reaches_handler() {
        let ctx = run(
            Cors::default(),
            Request::options("/").header(ORIGIN, "https://a.example"),
        )
        .await;
        assert_eq!(ctx.status_code(), Some(StatusCode::OK));
    }
}
