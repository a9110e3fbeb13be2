//! # Numbat Middleware
//!
//! The middleware chain and the built-in middleware shipped with Numbat.
//!
//! ## Built-in middleware
//!
//! | Middleware | Purpose |
//! |------------|---------|
//! | [`Logger`](stages::Logger) | Request id and one access log line per request |
//! | [`Recover`](stages::Recover) | Turns handler panics into a 500 response |
//! | [`Timeout`](stages::Timeout) | Cooperative per-request deadline |
//! | [`RateLimit`](stages::RateLimit) | Per-client token bucket |
//! | [`Gzip`](stages::Gzip) | Gzip response compression (feature `compression`) |
//! | [`Cors`](stages::Cors) | CORS preflight and response headers |
//! | [`SecurityHeaders`](stages::SecurityHeaders) | HSTS, nosniff, frame and referrer policy |
//! | [`BodyLimit`](stages::BodyLimit) | Rejects oversized request bodies |
//! | [`JwtAuth`](stages::JwtAuth) | Bearer token validation (feature `jwt`) |
//!
//! ## Ordering
//!
//! Middleware runs in registration order, outermost first. A typical stack:
//!
//! ```text
//! Recover -> Logger -> SecurityHeaders -> Cors -> RateLimit -> Gzip -> handler
//! ```

#![doc(html_root_url = "https://docs.rs/numbat-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod middleware;
pub mod sanitize;
pub mod stages;

#[cfg(test)]
pub(crate) mod test_support;

pub use middleware::{from_fn, run_chain, Chain, FnMiddleware, Middleware, Next};
pub use sanitize::{SanitizeConfig, Sanitizer};
