//! Common security response headers.

use http::header::{
    HeaderName, HeaderValue, REFERRER_POLICY, STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS,
    X_FRAME_OPTIONS,
};
use numbat_core::{BoxFuture, Context};

use crate::{Middleware, Next};

/// Settings for [`SecurityHeaders`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityHeadersConfig {
    /// `Strict-Transport-Security` max-age in seconds. Zero omits the header.
    pub hsts_max_age: u64,
    /// Adds `includeSubDomains` to HSTS.
    pub hsts_include_subdomains: bool,
    /// Adds `preload` to HSTS.
    pub hsts_preload: bool,
    /// Sets `X-Content-Type-Options: nosniff`.
    pub content_type_nosniff: bool,
    /// `X-Frame-Options` value. Empty omits the header.
    pub frame_option: String,
    /// `Referrer-Policy` value. Empty omits the header.
    pub referrer_policy: String,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            hsts_max_age: 63_072_000,
            hsts_include_subdomains: true,
            hsts_preload: false,
            content_type_nosniff: true,
            frame_option: "DENY".to_string(),
            referrer_policy: "strict-origin-when-cross-origin".to_string(),
        }
    }
}

/// Sets security headers on every response before the handler runs.
///
/// Header values are computed once at construction. A value that is not a
/// valid header value is dropped with a warning.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    /// Creates the middleware.
    #[must_use]
    pub fn new(config: &SecurityHeadersConfig) -> Self {
        let mut headers = Vec::with_capacity(4);

        if config.hsts_max_age > 0 {
            let mut hsts = format!("max-age={}", config.hsts_max_age);
            if config.hsts_include_subdomains {
                hsts.push_str("; includeSubDomains");
            }
            if config.hsts_preload {
                hsts.push_str("; preload");
            }
            push_header(&mut headers, STRICT_TRANSPORT_SECURITY, &hsts);
        }
        if config.content_type_nosniff {
            headers.push((X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")));
        }
        if !config.frame_option.is_empty() {
            push_header(&mut headers, X_FRAME_OPTIONS, &config.frame_option);
        }
        if !config.referrer_policy.is_empty() {
            push_header(&mut headers, REFERRER_POLICY, &config.referrer_policy);
        }

        Self { headers }
    }
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        Self::new(&SecurityHeadersConfig::default())
    }
}

fn push_header(headers: &mut Vec<(HeaderName, HeaderValue)>, name: HeaderName, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => headers.push((name, v)),
        Err(_) => tracing::warn!(header = %name, value, "invalid security header value ignored"),
    }
}

impl Middleware for SecurityHeaders {
    fn name(&self) -> &'static str {
        "security_headers"
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let response_headers = ctx.response_headers_mut();
            for (name, value) in &self.headers {
                response_headers.insert(name.clone(), value.clone());
            }
            next.run(ctx).await;
        })
    }
}
