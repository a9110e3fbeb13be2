//! Request body size limit.

use http::StatusCode;
use numbat_core::{BoxFuture, Context, ErrorResponse};

use crate::{Middleware, Next};

/// Rejects requests whose body is longer than the limit.
///
/// Bodies are fully collected before the chain runs, so the check is a
/// length comparison: oversized requests get
/// `413 {"error":"request body too large"}` and never reach the handler.
/// Accepted requests carry the limit as their
/// [`max_body_size`](Context::max_body_size). A limit of zero disables
/// the middleware.
#[derive(Debug, Clone, Copy)]
pub struct BodyLimit {
    max_bytes: usize,
}

impl BodyLimit {
    /// Creates the middleware.
    #[must_use]
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Middleware for BodyLimit {
    fn name(&self) -> &'static str {
        "body_limit"
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if self.max_bytes > 0 {
                let actual = ctx.body().len();
                if actual > self.max_bytes {
                    tracing::debug!(limit = self.max_bytes, actual, "request body too large");
                    ctx.json(
                        StatusCode::PAYLOAD_TOO_LARGE,
                        &ErrorResponse::new("request body too large"),
                    );
                    return;
                }
                ctx.set_max_body_size(self.max_bytes);
            }
            next.run(ctx).await;
        })
    }
}
