//! Panic recovery.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use http::StatusCode;
use numbat_core::{BoxFuture, Context, ErrorResponse};

use crate::{Middleware, Next};

/// Catches panics from the rest of the chain.
///
/// The panic is logged at `error` with its message and a backtrace. If no
/// response was committed yet, the client gets
/// `500 {"error":"internal server error"}`; otherwise the partial response
/// stands.
///
/// Register it first so it wraps every other middleware.
#[derive(Debug, Clone, Copy, Default)]
pub struct Recover;

impl Recover {
    /// Creates the middleware.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for Recover {
    fn name(&self) -> &'static str {
        "recover"
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let outcome = AssertUnwindSafe(next.run(ctx)).catch_unwind().await;
            if let Err(panic) = outcome {
                let message = panic_message(panic.as_ref());
                let backtrace = Backtrace::capture();
                tracing::error!(
                    panic = %message,
                    method = %ctx.method(),
                    path = %ctx.path(),
                    backtrace = %backtrace,
                    "panic recovered"
                );
                ctx.json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &ErrorResponse::new("internal server error"),
                );
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
