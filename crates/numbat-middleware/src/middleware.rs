//! Core middleware trait and chain composition.
//!
//! A middleware wraps everything after it: it may act before calling
//! [`Next::run`], after it returns, or skip it entirely to answer the
//! request itself. Chains run in registration order: the first middleware
//! registered is the outermost, so it sees the request first and the
//! finished response last.
//!
//! # Example
//!
//! ```rust
//! use numbat_core::{BoxFuture, Context};
//! use numbat_middleware::{Middleware, Next};
//!
//! struct PoweredBy;
//!
//! impl Middleware for PoweredBy {
//!     fn name(&self) -> &'static str {
//!         "powered-by"
//!     }
//!
//!     fn process<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, ()> {
//!         Box::pin(async move {
//!             ctx.set_header("x-powered-by", "numbat");
//!             next.run(ctx).await;
//!         })
//!     }
//! }
//! ```

use std::sync::Arc;

use numbat_core::{BoxFuture, Context, Handler};

/// A cross-cutting request wrapper.
///
/// # Invariants
///
/// - A middleware calls `next.run()` at most once
/// - A middleware that does not call `next.run()` must write a response
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Processes the request, delegating to `next` for the rest of the
    /// chain.
    fn process<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, ()>;
}

impl<M: Middleware + ?Sized> Middleware for Arc<M> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, ()> {
        (**self).process(ctx, next)
    }
}

/// The remainder of a middleware chain.
///
/// Consumed by [`run`](Next::run), so it can only be invoked once.
pub struct Next<'a> {
    stack: &'a [Arc<dyn Middleware>],
    handler: &'a dyn Handler,
}

impl<'a> Next<'a> {
    /// Creates a chain that runs `stack` in order and then `handler`.
    pub fn new(stack: &'a [Arc<dyn Middleware>], handler: &'a dyn Handler) -> Self {
        Self { stack, handler }
    }

    /// Invokes the next middleware, or the handler at the end of the chain.
    pub fn run<'b>(self, ctx: &'b mut Context) -> BoxFuture<'b, ()>
    where
        'a: 'b,
    {
        match self.stack.split_first() {
            Some((first, rest)) => first.process(
                ctx,
                Next {
                    stack: rest,
                    handler: self.handler,
                },
            ),
            None => self.handler.call(ctx),
        }
    }

    /// Number of middleware still to run before the handler.
    pub fn remaining(&self) -> usize {
        self.stack.len()
    }
}

/// Runs `handler` wrapped by `stack`.
pub fn run_chain<'a>(
    stack: &'a [Arc<dyn Middleware>],
    handler: &'a dyn Handler,
    ctx: &'a mut Context,
) -> BoxFuture<'a, ()> {
    Next::new(stack, handler).run(ctx)
}

/// An ordered middleware list that can be sealed around a handler.
///
/// ```rust
/// use numbat_core::handler_fn;
/// use numbat_middleware::{Chain, stages::Timeout};
/// use http::StatusCode;
/// use std::time::Duration;
///
/// let handler = Chain::new()
///     .with(Timeout::new(Duration::from_secs(5)))
///     .then(handler_fn(|ctx| Box::pin(async move { ctx.no_content() })));
/// # let _ = handler;
/// ```
#[derive(Clone, Default)]
pub struct Chain {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.middleware.iter().map(|m| m.name()).collect();
        f.debug_struct("Chain").field("middleware", &names).finish()
    }
}

impl Chain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware.
    #[must_use]
    pub fn with(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared middleware.
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    /// Appends every middleware of `other`, keeping its order.
    pub fn extend(&mut self, other: &Chain) {
        self.middleware.extend(other.middleware.iter().cloned());
    }

    /// The middleware in order.
    pub fn as_slice(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    /// Number of middleware.
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    /// True if there is no middleware.
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Seals the chain around `handler`.
    #[must_use]
    pub fn then(self, handler: impl Handler) -> Arc<dyn Handler> {
        self.then_arc(Arc::new(handler))
    }

    /// Seals the chain around a shared handler. An empty chain returns the
    /// handler unchanged.
    #[must_use]
    pub fn then_arc(self, handler: Arc<dyn Handler>) -> Arc<dyn Handler> {
        if self.middleware.is_empty() {
            return handler;
        }
        Arc::new(ChainedHandler {
            middleware: self.middleware.into(),
            handler,
        })
    }
}

struct ChainedHandler {
    middleware: Arc<[Arc<dyn Middleware>]>,
    handler: Arc<dyn Handler>,
}

impl Handler for ChainedHandler {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        run_chain(&self.middleware, self.handler.as_ref(), ctx)
    }
}

/// A middleware built from a closure. Created by [`from_fn`].
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, ()> {
        (self.func)(ctx, next)
    }
}

/// Wraps a closure as a [`Middleware`].
///
/// ```rust
/// use numbat_middleware::from_fn;
///
/// let tag = from_fn("tag", |ctx, next| {
///     Box::pin(async move {
///         ctx.set_header("x-tag", "1");
///         next.run(ctx).await;
///     })
/// });
/// # let _ = tag;
/// ```
pub const fn from_fn<F>(name: &'static str, func: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    FnMiddleware { name, func }
}
