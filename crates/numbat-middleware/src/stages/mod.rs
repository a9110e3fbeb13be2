//! Built-in middleware.

mod body_limit;
#[cfg(feature = "compression")]
mod compression;
mod cors;
#[cfg(feature = "jwt")]
mod jwt;
mod logger;
mod rate_limit;
mod recover;
mod security_headers;
mod timeout;

pub use body_limit::BodyLimit;
#[cfg(feature = "compression")]
pub use compression::{CompressionLevel, Gzip, GzipConfig, GzipResponseWriter};
pub use cors::{Cors, CorsConfig};
#[cfg(feature = "jwt")]
pub use jwt::{JwtAuth, JwtClaims, JwtConfig, KeyResolver};
pub use logger::{Logger, ACCESS_LOG_TARGET, REQUEST_ID_HEADER};
pub use rate_limit::{
    default_key, Decision, KeyFn, RateLimit, RateLimitConfig, TokenBucketLimiter,
};
pub use recover::Recover;
pub use security_headers::{SecurityHeaders, SecurityHeadersConfig};
pub use timeout::Timeout;
