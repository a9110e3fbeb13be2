//! Access logging with request ids.
//!
//! Every request gets a [`RequestId`]: the incoming `X-Request-Id` header
//! when it holds a usable value, otherwise a fresh UUID v7. The id is
//! stored in the request extensions (see [`Context::request_id`]) and
//! echoed on the response.
//!
//! After the rest of the chain returns, one `info` event is emitted on the
//! [`ACCESS_LOG_TARGET`] target with the fields `id`, `method`, `path`,
//! `status` and `duration_ms`. Route the target to a file with
//! `numbat-telemetry` to get a dedicated access log.

use std::time::Instant;

use http::HeaderValue;
use numbat_core::{BoxFuture, Context, RequestId};

use crate::sanitize::{SanitizeConfig, Sanitizer};
use crate::{Middleware, Next};

/// The header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tracing target of the access log events.
pub const ACCESS_LOG_TARGET: &str = "numbat::access";

const MAX_INCOMING_ID_LEN: usize = 128;

/// Middleware that assigns request ids and logs one line per request.
#[derive(Debug, Clone, Default)]
pub struct Logger {
    sanitizer: Option<Sanitizer>,
    log_headers: bool,
}

impl Logger {
    /// Creates a logger without redaction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Redacts path parameters, query parameters and headers in the log
    /// output.
    #[must_use]
    pub fn sanitize(mut self, config: &SanitizeConfig) -> Self {
        self.sanitizer = Sanitizer::new(config);
        self
    }

    /// Also logs the request headers at `debug` level, after redaction.
    #[must_use]
    pub fn log_headers(mut self, enabled: bool) -> Self {
        self.log_headers = enabled;
        self
    }

    fn request_id(ctx: &Context) -> RequestId {
        ctx.header(REQUEST_ID_HEADER)
            .filter(|id| is_usable_id(id))
            .map_or_else(RequestId::generate, RequestId::new)
    }

    fn log_path(&self, ctx: &Context) -> String {
        let path = match &self.sanitizer {
            Some(s) => s.path(ctx.path(), ctx.params()),
            None => ctx.path().to_string(),
        };
        match ctx.uri().query() {
            Some(query) if !query.is_empty() => {
                let query = match &self.sanitizer {
                    Some(s) => s.query(query),
                    None => query.to_string(),
                };
                format!("{path}?{query}")
            }
            _ => path,
        }
    }
}

fn is_usable_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_INCOMING_ID_LEN
        && id.bytes().all(|b| b.is_ascii_graphic())
}

impl Middleware for Logger {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let id = Self::request_id(ctx);
            if let Ok(value) = HeaderValue::from_str(id.as_str()) {
                ctx.response_headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            ctx.extensions_mut().insert(id.clone());

            if self.log_headers {
                let headers = match &self.sanitizer {
                    Some(s) => s.headers(ctx.headers()),
                    None => None,
                }
                .unwrap_or_else(|| ctx.headers().clone());
                tracing::debug!(target: ACCESS_LOG_TARGET, id = %id, headers = ?headers, "request headers");
            }

            let start = Instant::now();
            next.run(ctx).await;
            let elapsed = start.elapsed();

            let status = ctx.status_code().map_or(200, |s| s.as_u16());
            tracing::info!(
                target: ACCESS_LOG_TARGET,
                id = %id,
                method = %ctx.method(),
                path = %self.log_path(ctx),
                status,
                duration_ms = elapsed.as_secs_f64() * 1000.0,
                "request"
            );
        })
    }
}
