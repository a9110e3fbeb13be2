//! Cooperative request deadlines.

use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use futures_util::FutureExt;
use numbat_core::{BoxFuture, Context};
use tokio::time::Instant;

use crate::{Middleware, Next};

/// Attaches a deadline to the request.
///
/// Handlers observe it through [`Context::is_expired`] and
/// [`Context::done`]; nothing is cancelled or written on their behalf. An
/// earlier deadline set by an outer middleware is kept. The previous
/// deadline is restored when the chain returns or panics. A zero duration disables
/// the middleware.
///
/// ```rust
/// use numbat_core::handler_fn;
/// use http::StatusCode;
///
/// let slow = handler_fn(|ctx| {
///     Box::pin(async move {
///         tokio::select! {
///             () = ctx.done() => ctx.text(StatusCode::SERVICE_UNAVAILABLE, "timed out"),
///             () = tokio::time::sleep(std::time::Duration::from_secs(1)) => ctx.no_content(),
///         }
///     })
/// });
/// # let _ = slow;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Timeout {
    duration: Duration,
}

impl Timeout {
    /// Creates the middleware.
    #[must_use]
    pub const fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// The configured duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }
}

impl Middleware for Timeout {
    fn name(&self) -> &'static str {
        "timeout"
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if self.duration.is_zero() {
                next.run(ctx).await;
                return;
            }

            let candidate = Instant::now() + self.duration;
            let deadline = ctx.deadline().map_or(candidate, |d| d.min(candidate));
            let previous = ctx.set_deadline(Some(deadline));
            let outcome = AssertUnwindSafe(next.run(ctx)).catch_unwind().await;
            ctx.set_deadline(previous);
            if let Err(payload) = outcome {
                panic::resume_unwind(payload);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ctx, run_one};
    use http::StatusCode;
    use numbat_core::handler_fn;

    fn racing_handler() -> impl numbat_core::Handler {
        handler_fn(|ctx| {
            Box::pin(async move {
                tokio::select! {
                    () = ctx.done() => ctx.status(StatusCode::SERVICE_UNAVAILABLE),
                    () = tokio::time::sleep(Duration::from_millis(200)) => ctx.status(StatusCode::OK),
                }
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires() {
        let mut ctx = ctx("/");
        run_one(Timeout::new(Duration::from_millis(50)), racing_handler(), &mut ctx).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_handler_finishes() {
        let mut ctx = ctx("/");
        run_one(Timeout::new(Duration::from_secs(1)), racing_handler(), &mut ctx).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::OK));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_duration_sets_nothing() {
        let handler = handler_fn(|ctx| {
            Box::pin(async move {
                let status = if ctx.deadline().is_none() {
                    StatusCode::OK
                } else {
                    StatusCode::CONFLICT
                };
                ctx.status(status);
            })
        });
        let mut ctx = ctx("/");
        run_one(Timeout::new(Duration::ZERO), handler, &mut ctx).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::OK));
    }

    #[tokio::test(start_paused = true)]
    async fn test_earlier_deadline_kept_and_restored() {
        let mut ctx = ctx("/");
        let outer = Instant::now() + Duration::from_millis(10);
        ctx.set_deadline(Some(outer));

        let seen = std::sync::Arc::new(parking_lot::Mutex::new(None));
        let seen_in = seen.clone();
        let handler = handler_fn(move |ctx| {
            let seen = seen_in.clone();
            Box::pin(async move {
                *seen.lock() = ctx.deadline();
                ctx.no_content();
            })
        });
        run_one(Timeout::new(Duration::from_secs(5)), handler, &mut ctx).await;

        assert_eq!(*seen.lock(), Some(outer));
        assert_eq!(ctx.deadline(), Some(outer));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_removed_after_chain() {
        let mut ctx = ctx("/");
        run_one(Timeout::new(Duration::from_secs(1)), racing_handler(), &mut ctx).await;
        assert!(ctx.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_restored_when_handler_panics() {
        use crate::stages::Recover;
        use std::sync::Arc;

        let stack: Vec<Arc<dyn crate::Middleware>> = vec![
            Arc::new(Recover::new()),
            Arc::new(Timeout::new(Duration::from_secs(1))),
        ];
        let handler = handler_fn(|_ctx| Box::pin(async move { panic!("boom") }));
        let mut ctx = ctx("/");
        let outer = Instant::now() + Duration::from_secs(30);
        ctx.set_deadline(Some(outer));

        crate::run_chain(&stack, &handler, &mut ctx).await;

        assert_eq!(ctx.status_code(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(ctx.deadline(), Some(outer));
    }
}
