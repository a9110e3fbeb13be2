//! Handler trait for request processing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::Context;

/// A boxed, sendable future borrowing from `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Terminal request processor.
///
/// A handler reads the request and writes its response through the
/// [`Context`]. It returns nothing: whatever it wrote is the response.
///
/// Most handlers are closures wrapped with [`handler_fn`]; implement the
/// trait directly when the handler carries state.
///
/// # Example
///
/// ```rust
/// use numbat_core::{BoxFuture, Context, Handler};
/// use http::StatusCode;
///
/// struct Greeting(&'static str);
///
/// impl Handler for Greeting {
///     fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
///         Box::pin(async move {
///             ctx.text(StatusCode::OK, self.0);
///         })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Processes one request.
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        (**self).call(ctx)
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        (**self).call(ctx)
    }
}

/// A closure adapted into a [`Handler`]. Created by [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> std::fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFn").finish_non_exhaustive()
    }
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        (self.f)(ctx)
    }
}

/// Wraps a closure returning a boxed future as a [`Handler`].
///
/// ```rust
/// use numbat_core::handler_fn;
/// use http::StatusCode;
///
/// let hello = handler_fn(|ctx| {
///     Box::pin(async move {
///         ctx.text(StatusCode::OK, "hello");
///     })
/// });
/// # let _ = hello;
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    HandlerFn { f }
}
