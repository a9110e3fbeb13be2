//! Per-client rate limiting.
//!
//! Each client key owns a token bucket holding at most `burst` tokens and
//! refilled continuously at `rate` tokens per second. A request spends one
//! token; a request arriving with less than one token is rejected with
//! `429 Too Many Requests` and a `Retry-After` header.
//!
//! Idle buckets are dropped by a background sweeper that starts with the
//! first request and stops once the middleware is dropped.
//!
//! ## Example
//!
//! ```rust
//! use numbat_middleware::stages::{RateLimit, RateLimitConfig};
//!
//! let limit = RateLimit::new(
//!     RateLimitConfig::new()
//!         .rate(5.0)
//!         .burst(10)
//!         .key_fn(|ctx| ctx.header("x-api-key").unwrap_or("anonymous").to_string()),
//! );
//! # let _ = limit;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use http::{HeaderValue, StatusCode};
use numbat_config::RateLimitSection;
use numbat_core::{BoxFuture, Context, ErrorResponse};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{Middleware, Next};

/// Rate limit header names.
pub mod headers {
    /// Seconds to wait before retrying (on 429).
    pub const RETRY_AFTER: &str = "retry-after";
    /// Proxy chain carrying the original client address.
    pub const FORWARDED_FOR: &str = "x-forwarded-for";
}

const DEFAULT_RATE: f64 = 10.0;
const DEFAULT_BURST: u32 = 20;
const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);

/// Extracts the bucket key from a request.
pub type KeyFn = Arc<dyn Fn(&Context) -> String + Send + Sync>;

/// Rate limiter settings.
///
/// Non-positive values fall back to the defaults: 10 requests per second,
/// burst of 20, sweep every minute, forget clients idle for five minutes.
#[derive(Clone)]
pub struct RateLimitConfig {
    rate: f64,
    burst: u32,
    cleanup_interval: Duration,
    stale_after: Duration,
    key_fn: Option<KeyFn>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            burst: DEFAULT_BURST,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
            key_fn: None,
        }
    }
}

impl std::fmt::Debug for RateLimitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitConfig")
            .field("rate", &self.rate)
            .field("burst", &self.burst)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("stale_after", &self.stale_after)
            .field("key_fn", &self.key_fn.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl RateLimitConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sustained requests per second per key.
    #[must_use]
    pub fn rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Maximum tokens a bucket can hold.
    #[must_use]
    pub fn burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// How often idle buckets are swept.
    #[must_use]
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Idle time after which a bucket is dropped.
    #[must_use]
    pub fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Custom key extraction. Defaults to [`default_key`].
    #[must_use]
    pub fn key_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> String + Send + Sync + 'static,
    {
        self.key_fn = Some(Arc::new(f));
        self
    }

    fn normalized(mut self) -> Self {
        if self.rate.is_nan() || self.rate <= 0.0 {
            self.rate = DEFAULT_RATE;
        }
        if self.burst == 0 {
            self.burst = DEFAULT_BURST;
        }
        if self.cleanup_interval.is_zero() {
            self.cleanup_interval = DEFAULT_CLEANUP_INTERVAL;
        }
        if self.stale_after.is_zero() {
            self.stale_after = DEFAULT_STALE_AFTER;
        }
        self
    }
}

impl From<&RateLimitSection> for RateLimitConfig {
    /// The `enabled` flag is left to the caller.
    fn from(section: &RateLimitSection) -> Self {
        Self::new()
            .rate(section.rate)
            .burst(section.burst)
            .cleanup_interval(Duration::from_secs(section.cleanup_interval_secs))
            .stale_after(Duration::from_secs(section.stale_after_secs))
    }
}

/// The client key used when no key function is configured.
///
/// The first entry of `X-Forwarded-For`, else the peer IP, else
/// `"unknown"`.
pub fn default_key(ctx: &Context) -> String {
    if let Some(xff) = ctx.header(headers::FORWARDED_FOR) {
        let first = xff.split(',').next().unwrap_or_default().trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }
    ctx.remote_addr()
        .map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}

/// Outcome of [`TokenBucketLimiter::allow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// A token was spent.
    Allow,
    /// Not enough tokens.
    Deny {
        /// Whole seconds until one token is available, at least 1.
        retry_after_secs: u64,
    },
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_seen: Instant,
}

/// Token buckets keyed by client.
///
/// All operations take an explicit `now` so callers and tests control the
/// clock.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    rate: f64,
    burst: f64,
    stale_after: Duration,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl TokenBucketLimiter {
    /// Creates a limiter. Non-positive values fall back to the defaults.
    #[must_use]
    pub fn new(rate: f64, burst: u32, stale_after: Duration) -> Self {
        let config = RateLimitConfig::new()
            .rate(rate)
            .burst(burst)
            .stale_after(stale_after)
            .normalized();
        Self::from_config(&config)
    }

    fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            rate: config.rate,
            burst: f64::from(config.burst),
            stale_after: config.stale_after,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Tries to spend one token from `key`'s bucket.
    pub fn allow(&self, key: &str, now: Instant) -> Decision {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.burst,
            last_seen: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_seen).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_seen = now;

        if bucket.tokens < 1.0 {
            let wait = ((1.0 - bucket.tokens) / self.rate).ceil();
            return Decision::Deny {
                retry_after_secs: (wait as u64).max(1),
            };
        }

        bucket.tokens -= 1.0;
        Decision::Allow
    }

    /// Drops buckets idle for longer than the stale period. Returns how
    /// many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut buckets = self.buckets.lock();
        let before = buckets.len();
        buckets.retain(|_, b| now.saturating_duration_since(b.last_seen) <= self.stale_after);
        before - buckets.len()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.buckets.lock().len()
    }

    /// True if no key is tracked.
    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }
}

/// Rate limiting middleware.
pub struct RateLimit {
    limiter: Arc<TokenBucketLimiter>,
    key_fn: KeyFn,
    cleanup_interval: Duration,
    sweeper: OnceLock<()>,
}

impl std::fmt::Debug for RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimit")
            .field("limiter", &self.limiter)
            .field("cleanup_interval", &self.cleanup_interval)
            .field("key_fn", &"<fn>")
            .finish_non_exhaustive()
    }
}

impl RateLimit {
    /// Creates the middleware.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let config = config.normalized();
        let limiter = Arc::new(TokenBucketLimiter::from_config(&config));
        let key_fn = config.key_fn.unwrap_or_else(|| Arc::new(default_key) as KeyFn);
        Self {
            limiter,
            key_fn,
            cleanup_interval: config.cleanup_interval,
            sweeper: OnceLock::new(),
        }
    }

    /// The underlying limiter.
    pub fn limiter(&self) -> &Arc<TokenBucketLimiter> {
        &self.limiter
    }

    fn ensure_sweeper(&self) {
        self.sweeper.get_or_init(|| {
            let Ok(handle) = tokio::runtime::Handle::try_current() else {
                tracing::debug!("no runtime, rate limit sweeper not started");
                return;
            };
            handle.spawn(sweep_loop(Arc::downgrade(&self.limiter), self.cleanup_interval));
        });
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

async fn sweep_loop(limiter: Weak<TokenBucketLimiter>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let Some(limiter) = limiter.upgrade() else {
            break;
        };
        let removed = limiter.sweep(Instant::now());
        if removed > 0 {
            tracing::debug!(removed, remaining = limiter.len(), "swept idle rate limit buckets");
        }
    }
}

impl Middleware for RateLimit {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_sweeper();
            let key = (self.key_fn)(ctx);

            match self.limiter.allow(&key, Instant::now()) {
                Decision::Allow => next.run(ctx).await,
                Decision::Deny { retry_after_secs } => {
                    tracing::debug!(key, retry_after_secs, "rate limit exceeded");
                    ctx.response_headers_mut()
                        .insert(headers::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                    ctx.json(
                        StatusCode::TOO_MANY_REQUESTS,
                        &ErrorResponse::new("rate limit exceeded"),
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ctx, request, run_one};
    use http::Request;
    use numbat_core::handler_fn;
    use std::net::SocketAddr;

    #[test]
    fn test_config_from_section() {
        let section = RateLimitSection {
            enabled: true,
            rate: 2.0,
            burst: 4,
            cleanup_interval_secs: 10,
            stale_after_secs: 30,
        };
        let config = RateLimitConfig::from(&section);
        assert!((config.rate - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.burst, 4);
        assert_eq!(config.cleanup_interval, Duration::from_secs(10));
        assert_eq!(config.stale_after, Duration::from_secs(30));
    }

    fn ok() -> impl numbat_core::Handler {
        handler_fn(|ctx| Box::pin(async move { ctx.no_content() }))
    }

    #[test]
    fn test_burst_then_deny() {
        let limiter = TokenBucketLimiter::new(1.0, 3, Duration::from_secs(60));
        let now = Instant::now();
        for _ in 0..3 {
            assert_eq!(limiter.allow("a", now), Decision::Allow);
        }
        assert_eq!(
            limiter.allow("a", now),
            Decision::Deny {
                retry_after_secs: 1
            }
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = TokenBucketLimiter::new(1.0, 1, Duration::from_secs(60));
        let now = Instant::now();
        assert_eq!(limiter.allow("a", now), Decision::Allow);
        assert_eq!(limiter.allow("b", now), Decision::Allow);
        assert!(matches!(limiter.allow("a", now), Decision::Deny { .. }));
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_refill_over_time() {
        let limiter = TokenBucketLimiter::new(2.0, 2, Duration::from_secs(60));
        let start = Instant::now();
        limiter.allow("a", start);
        limiter.allow("a", start);
        assert!(matches!(limiter.allow("a", start), Decision::Deny { .. }));

        let later = start + Duration::from_millis(500);
        assert_eq!(limiter.allow("a", later), Decision::Allow);
    }

    #[test]
    fn test_refill_capped_at_burst() {
        let limiter = TokenBucketLimiter::new(100.0, 2, Duration::from_secs(600));
        let start = Instant::now();
        limiter.allow("a", start);
        let later = start + Duration::from_secs(60);
        assert_eq!(limiter.allow("a", later), Decision::Allow);
        assert_eq!(limiter.allow("a", later), Decision::Allow);
        assert!(matches!(limiter.allow("a", later), Decision::Deny { .. }));
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let limiter = TokenBucketLimiter::new(0.25, 1, Duration::from_secs(60));
        let now = Instant::now();
        limiter.allow("a", now);
        assert_eq!(
            limiter.allow("a", now),
            Decision::Deny {
                retry_after_secs: 4
            }
        );
    }

    #[test]
    fn test_sweep_removes_idle() {
        let limiter = TokenBucketLimiter::new(1.0, 1, Duration::from_secs(10));
        let start = Instant::now();
        limiter.allow("old", start);
        limiter.allow("new", start + Duration::from_secs(8));

        assert_eq!(limiter.sweep(start + Duration::from_secs(15)), 1);
        assert_eq!(limiter.len(), 1);
        assert_eq!(limiter.sweep(start + Duration::from_secs(15)), 0);
    }

    #[test]
    fn test_non_positive_values_use_defaults() {
        let limiter = TokenBucketLimiter::new(-1.0, 0, Duration::ZERO);
        let now = Instant::now();
        for _ in 0..20 {
            assert_eq!(limiter.allow("a", now), Decision::Allow);
        }
        assert!(matches!(limiter.allow("a", now), Decision::Deny { .. }));
    }

    #[test]
    fn test_default_key_prefers_forwarded_for() {
        let ctx = request(
            Request::get("/").header("x-forwarded-for", " 10.0.0.1 , 10.0.0.2"),
            b"",
        );
        assert_eq!(default_key(&ctx), "10.0.0.1");
    }

    #[test]
    fn test_default_key_remote_addr_and_unknown() {
        let addr: SocketAddr = "192.168.1.9:4000".parse().unwrap();
        let with_peer = ctx("/").with_remote_addr(addr);
        assert_eq!(default_key(&with_peer), "192.168.1.9");
        assert_eq!(default_key(&ctx("/")), "unknown");
    }

    #[tokio::test(start_paused = true)]
    async fn test_middleware_rejects_with_retry_after() {
        let limit = Arc::new(RateLimit::new(RateLimitConfig::new().rate(1.0).burst(1)));

        let mut first = ctx("/");
        run_one(limit.clone(), ok(), &mut first).await;
        assert_eq!(first.status_code(), Some(StatusCode::NO_CONTENT));

        let mut second = ctx("/");
        run_one(limit.clone(), ok(), &mut second).await;
        assert_eq!(second.status_code(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(second.response_headers()[headers::RETRY_AFTER], "1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_key_fn() {
        let limit = Arc::new(RateLimit::new(
            RateLimitConfig::new()
                .burst(1)
                .key_fn(|ctx| ctx.header("x-api-key").unwrap_or("none").to_string()),
        ));

        for key in ["k1", "k2"] {
            let mut c = request(Request::get("/").header("x-api-key", key), b"");
            run_one(limit.clone(), ok(), &mut c).await;
            assert_eq!(c.status_code(), Some(StatusCode::NO_CONTENT));
        }
        assert_eq!(limit.limiter().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_drops_idle_buckets() {
        let limit = Arc::new(RateLimit::new(
            RateLimitConfig::new()
                .cleanup_interval(Duration::from_secs(1))
                .stale_after(Duration::from_secs(2)),
        ));
        let mut c = ctx("/");
        run_one(limit.clone(), ok(), &mut c).await;
        assert_eq!(limit.limiter().len(), 1);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(limit.limiter().is_empty());
    }

    #[test]
    fn test_debug_hides_key_fn() {
        let config = RateLimitConfig::new().key_fn(|_| String::new());
        assert!(format!("{config:?}").contains("<fn>"));
    }
}
