//! The dispatcher: route registration, groups and request dispatch.
//!
//! A [`Router`] owns the route trie, the global middleware list and the
//! fallback policies behind one read-write lock. Registration takes the
//! write lock, so routes may be added while serving. Dispatch takes the read
//! lock only long enough to plan the request (look up the handler and
//! snapshot the middleware) and releases it before running anything.
//!
//! Every outcome runs inside the global middleware: matched routes, 404 and
//! 405 answers, and trailing-slash redirects alike.
//!
//! # Example
//!
//! ```rust
//! use numbat_core::handler_fn;
//! use numbat_middleware::stages::Recover;
//! use numbat_server::Router;
//! use http::StatusCode;
//!
//! let router = Router::new();
//! router.use_middleware(Recover::new());
//! router.get("/users/:id", handler_fn(|ctx| Box::pin(async move {
//!     let id = ctx.param("id").unwrap_or_default().to_string();
//!     ctx.text(StatusCode::OK, id);
//! })));
//!
//! let mut api = router.group("/api");
//! api.get("/health", handler_fn(|ctx| Box::pin(async move { ctx.no_content() })));
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use http::header::ALLOW;
use http::{HeaderValue, Method, StatusCode};
use numbat_core::{
    handler_fn, BoxFuture, Context, ErrorResponse, Handler, RoutingError, DEFAULT_MAX_BODY_SIZE,
};
use numbat_middleware::{run_chain, Chain, Middleware};
use numbat_router::{PathMatcher, Resolution, RouteError};
use parking_lot::RwLock;

use crate::static_files::{FileHandler, StaticFiles};

/// Methods registered by [`Router::any`].
pub const ANY_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
];

/// Hook answering not-found and method-not-allowed outcomes.
///
/// It receives the status and the [`RoutingError`] sentinel, so one
/// function can render both.
pub type ErrorHook = Arc<
    dyn for<'a> Fn(&'a mut Context, StatusCode, RoutingError) -> BoxFuture<'a, ()>
        + Send
        + Sync,
>;

type Stack = Arc<[Arc<dyn Middleware>]>;

struct RouterState {
    routes: PathMatcher<Arc<dyn Handler>>,
    middleware: Stack,
    not_found: Arc<dyn Handler>,
    method_not_allowed: Arc<dyn Handler>,
    error_hook: Option<ErrorHook>,
    redirect_trailing_slash: bool,
    max_body_size: usize,
}

impl RouterState {
    fn failure(&self, error: RoutingError) -> Arc<dyn Handler> {
        if let Some(hook) = &self.error_hook {
            return Arc::new(HookHandler {
                hook: Arc::clone(hook),
                error,
            });
        }
        match error {
            RoutingError::NotFound => Arc::clone(&self.not_found),
            RoutingError::MethodNotAllowed => Arc::clone(&self.method_not_allowed),
        }
    }
}

/// HTTP method router with middleware, groups and fallback policies.
///
/// All methods take `&self`; share the router behind an `Arc` to serve it.
/// The fluent registration methods panic on an invalid pattern, since a
/// router with ambiguous routes should not start. Use
/// [`try_handle`](Self::try_handle) to handle the error instead.
pub struct Router {
    state: RwLock<RouterState>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Router")
            .field("routes", &state.routes.len())
            .field("middleware", &state.middleware.len())
            .field("redirect_trailing_slash", &state.redirect_trailing_slash)
            .field("max_body_size", &state.max_body_size)
            .finish_non_exhaustive()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates a router with JSON 404 and 405 answers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RouterState {
                routes: PathMatcher::new(),
                middleware: Arc::from(Vec::new()),
                not_found: Arc::new(handler_fn(|ctx| {
                    Box::pin(async move { default_failure(ctx, RoutingError::NotFound) })
                })),
                method_not_allowed: Arc::new(handler_fn(|ctx| {
                    Box::pin(async move { default_failure(ctx, RoutingError::MethodNotAllowed) })
                })),
                error_hook: None,
                redirect_trailing_slash: false,
                max_body_size: DEFAULT_MAX_BODY_SIZE,
            }),
        }
    }

    // ----- registration -----

    /// Registers `handler` for `method` at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`RouteError`] if the path does not start with `/` or
    /// conflicts with an existing parameter or wildcard name.
    pub fn try_handle(
        &self,
        method: Method,
        path: &str,
        handler: impl Handler,
    ) -> Result<(), RouteError> {
        self.register("", method, path, Arc::new(handler), &Chain::new())
    }

    /// Registers `handler` wrapped by route middleware.
    ///
    /// # Errors
    ///
    /// See [`try_handle`](Self::try_handle).
    pub fn try_handle_with(
        &self,
        method: Method,
        path: &str,
        handler: impl Handler,
        middleware: &Chain,
    ) -> Result<(), RouteError> {
        self.register("", method, path, Arc::new(handler), middleware)
    }

    /// Registers `handler` for `method` at `path`.
    ///
    /// # Panics
    ///
    /// Panics with the [`RouteError`] message on an invalid pattern.
    pub fn handle(&self, method: Method, path: &str, handler: impl Handler) -> &Self {
        self.handle_with(method, path, handler, &Chain::new())
    }

    /// Registers `handler` wrapped by route middleware. The first middleware
    /// in `middleware` is the outermost.
    ///
    /// # Panics
    ///
    /// Panics with the [`RouteError`] message on an invalid pattern.
    pub fn handle_with(
        &self,
        method: Method,
        path: &str,
        handler: impl Handler,
        middleware: &Chain,
    ) -> &Self {
        if let Err(err) = self.register("", method, path, Arc::new(handler), middleware) {
            panic!("{err}");
        }
        self
    }

    /// Registers a GET handler.
    pub fn get(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::GET, path, handler)
    }

    /// Registers a POST handler.
    pub fn post(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::POST, path, handler)
    }

    /// Registers a PUT handler.
    pub fn put(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::PUT, path, handler)
    }

    /// Registers a PATCH handler.
    pub fn patch(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::PATCH, path, handler)
    }

    /// Registers a DELETE handler.
    pub fn delete(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::DELETE, path, handler)
    }

    /// Registers a HEAD handler. GET handlers already answer HEAD.
    pub fn head(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::HEAD, path, handler)
    }

    /// Registers an OPTIONS handler.
    pub fn options(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::OPTIONS, path, handler)
    }

    /// Registers one handler for every method in [`ANY_METHODS`].
    pub fn any(&self, path: &str, handler: impl Handler) -> &Self {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        for method in ANY_METHODS {
            if let Err(err) = self.register("", method, path, Arc::clone(&handler), &Chain::new()) {
                panic!("{err}");
            }
        }
        self
    }

    /// Adds global middleware. It wraps every dispatch, including 404, 405
    /// and redirect answers.
    pub fn use_middleware(&self, middleware: impl Middleware) -> &Self {
        self.use_shared(Arc::new(middleware))
    }

    /// Adds already shared global middleware.
    pub fn use_shared(&self, middleware: Arc<dyn Middleware>) -> &Self {
        let mut state = self.state.write();
        let mut stack = state.middleware.to_vec();
        stack.push(middleware);
        state.middleware = stack.into();
        self
    }

    /// Starts a route group under `prefix`.
    pub fn group(&self, prefix: &str) -> Group<'_> {
        Group {
            router: self,
            prefix: trim_prefix(prefix),
            middleware: Chain::new(),
        }
    }

    /// Serves `files` for GET and HEAD under `prefix/*`.
    ///
    /// The bare prefix is registered as well, since a wildcard needs at
    /// least one segment; it serves the directory index.
    pub fn serve_files(&self, prefix: &str, files: StaticFiles) -> &Self {
        let prefix = trim_prefix(prefix);
        let (base, route) = if prefix.is_empty() {
            ("/".to_string(), "/*".to_string())
        } else {
            (format!("/{prefix}"), format!("/{prefix}/*"))
        };
        let handler: Arc<dyn Handler> = Arc::new(StaticFilesHandler { files });
        for pattern in [&base, &route] {
            for method in [Method::GET, Method::HEAD] {
                if let Err(err) =
                    self.register("", method, pattern, Arc::clone(&handler), &Chain::new())
                {
                    panic!("{err}");
                }
            }
        }
        self
    }

    /// Serves the single file at `file_path` for GET and HEAD at `path`.
    pub fn file(&self, path: &str, file_path: impl Into<PathBuf>) -> &Self {
        let handler: Arc<dyn Handler> = Arc::new(FileHandler::new(file_path.into()));
        for method in [Method::GET, Method::HEAD] {
            if let Err(err) = self.register("", method, path, Arc::clone(&handler), &Chain::new()) {
                panic!("{err}");
            }
        }
        self
    }

    // ----- policies -----

    /// Replaces the 404 handler.
    pub fn not_found(&self, handler: impl Handler) -> &Self {
        self.state.write().not_found = Arc::new(handler);
        self
    }

    /// Replaces the 405 handler. The `Allow` header is already set when it
    /// runs.
    pub fn method_not_allowed(&self, handler: impl Handler) -> &Self {
        self.state.write().method_not_allowed = Arc::new(handler);
        self
    }

    /// Routes both 404 and 405 outcomes to one hook, overriding the
    /// [`not_found`](Self::not_found) and
    /// [`method_not_allowed`](Self::method_not_allowed) handlers.
    ///
    /// ```rust
    /// use numbat_core::ErrorResponse;
    /// use numbat_server::Router;
    ///
    /// let router = Router::new();
    /// router.error_handler(|ctx, status, err| Box::pin(async move {
    ///     ctx.json(status, &ErrorResponse::new(err.to_string()).with_code("ROUTING"));
    /// }));
    /// ```
    pub fn error_handler<F>(&self, hook: F) -> &Self
    where
        F: for<'a> Fn(&'a mut Context, StatusCode, RoutingError) -> BoxFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        self.state.write().error_hook = Some(Arc::new(hook));
        self
    }

    /// Redirects `/path/` to `/path` with a 301 when enabled.
    pub fn redirect_trailing_slash(&self, enabled: bool) -> &Self {
        self.state.write().redirect_trailing_slash = enabled;
        self
    }

    /// Sets the body limit handed to every [`Context`]. Zero restores the
    /// 10 MiB default.
    pub fn max_body_size(&self, limit: usize) -> &Self {
        self.state.write().max_body_size = if limit == 0 {
            DEFAULT_MAX_BODY_SIZE
        } else {
            limit
        };
        self
    }

    /// Number of registered `(method, pattern)` pairs.
    pub fn route_count(&self) -> usize {
        self.state.read().routes.len()
    }

    fn register(
        &self,
        prefix: &str,
        method: Method,
        path: &str,
        handler: Arc<dyn Handler>,
        middleware: &Chain,
    ) -> Result<(), RouteError> {
        if !path.starts_with('/') {
            return Err(RouteError::NotRooted(path.to_string()));
        }
        let pattern = if prefix.is_empty() {
            path.to_string()
        } else {
            format!("/{prefix}{path}")
        };
        let handler = middleware.clone().then_arc(handler);

        let mut state = self.state.write();
        let replaced = state.routes.insert(method.clone(), &pattern, handler)?;
        if replaced.is_some() {
            tracing::warn!(%method, path = %pattern, "route registered twice, keeping the latest");
        }
        Ok(())
    }

    // ----- dispatch -----

    /// Dispatches a request through the global middleware to its handler.
    pub async fn dispatch(&self, ctx: &mut Context) {
        let (stack, terminal) = self.plan(ctx);
        run_chain(&stack, terminal.as_ref(), ctx).await;
    }

    fn plan(&self, ctx: &mut Context) -> (Stack, Arc<dyn Handler>) {
        let state = self.state.read();
        ctx.set_max_body_size(state.max_body_size);
        let stack = Arc::clone(&state.middleware);

        if state.redirect_trailing_slash {
            if let Some(location) = trailing_slash_target(ctx.path(), ctx.uri().query()) {
                return (stack, Arc::new(Redirect { location }));
            }
        }

        let path = decode_path(ctx.path());
        let terminal = match state.routes.resolve(ctx.method(), &path) {
            Resolution::Matched { value, params } => {
                ctx.set_params(params);
                Arc::clone(value)
            }
            Resolution::MethodNotAllowed { allowed } => {
                let allow = allowed
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    ctx.response_headers_mut().insert(ALLOW, value);
                }
                state.failure(RoutingError::MethodNotAllowed)
            }
            Resolution::NotFound => state.failure(RoutingError::NotFound),
        };
        (stack, terminal)
    }
}

impl Handler for Router {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(self.dispatch(ctx))
    }
}

/// Routes registered under a shared prefix and middleware.
///
/// Group middleware runs inside the global middleware and outside any
/// route middleware. Nested groups inherit the parent's prefix and
/// middleware.
#[derive(Debug)]
pub struct Group<'r> {
    router: &'r Router,
    prefix: String,
    middleware: Chain,
}

impl<'r> Group<'r> {
    /// The joined prefix, without leading or trailing `/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Adds group middleware. Routes registered afterwards are wrapped by it.
    pub fn use_middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Starts a nested group.
    pub fn group(&self, prefix: &str) -> Group<'r> {
        let sub = trim_prefix(prefix);
        let prefix = match (self.prefix.is_empty(), sub.is_empty()) {
            (true, _) => sub,
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}/{sub}", self.prefix),
        };
        Group {
            router: self.router,
            prefix,
            middleware: self.middleware.clone(),
        }
    }

    /// Registers `handler` under the group prefix.
    ///
    /// # Errors
    ///
    /// See [`Router::try_handle`].
    pub fn try_handle(
        &self,
        method: Method,
        path: &str,
        handler: impl Handler,
    ) -> Result<(), RouteError> {
        self.try_handle_with(method, path, handler, &Chain::new())
    }

    /// Registers `handler` wrapped by group and then route middleware.
    ///
    /// # Errors
    ///
    /// See [`Router::try_handle`].
    pub fn try_handle_with(
        &self,
        method: Method,
        path: &str,
        handler: impl Handler,
        middleware: &Chain,
    ) -> Result<(), RouteError> {
        let mut chain = self.middleware.clone();
        chain.extend(middleware);
        self.router
            .register(&self.prefix, method, path, Arc::new(handler), &chain)
    }

    /// Registers `handler` under the group prefix.
    ///
    /// # Panics
    ///
    /// Panics with the [`RouteError`] message on an invalid pattern.
    pub fn handle(&self, method: Method, path: &str, handler: impl Handler) -> &Self {
        self.handle_with(method, path, handler, &Chain::new())
    }

    /// Registers `handler` wrapped by group and then route middleware.
    ///
    /// # Panics
    ///
    /// Panics with the [`RouteError`] message on an invalid pattern.
    pub fn handle_with(
        &self,
        method: Method,
        path: &str,
        handler: impl Handler,
        middleware: &Chain,
    ) -> &Self {
        if let Err(err) = self.try_handle_with(method, path, handler, middleware) {
            panic!("{err}");
        }
        self
    }

    /// Registers a GET handler.
    pub fn get(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::GET, path, handler)
    }

    /// Registers a POST handler.
    pub fn post(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::POST, path, handler)
    }

    /// Registers a PUT handler.
    pub fn put(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::PUT, path, handler)
    }

    /// Registers a PATCH handler.
    pub fn patch(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::PATCH, path, handler)
    }

    /// Registers a DELETE handler.
    pub fn delete(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::DELETE, path, handler)
    }

    /// Registers a HEAD handler.
    pub fn head(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::HEAD, path, handler)
    }

    /// Registers an OPTIONS handler.
    pub fn options(&self, path: &str, handler: impl Handler) -> &Self {
        self.handle(Method::OPTIONS, path, handler)
    }
}

fn default_failure(ctx: &mut Context, error: RoutingError) {
    ctx.json(error.status_code(), &ErrorResponse::new(error.to_string()));
}

struct HookHandler {
    hook: ErrorHook,
    error: RoutingError,
}

impl Handler for HookHandler {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        (self.hook)(ctx, self.error.status_code(), self.error)
    }
}

struct Redirect {
    location: String,
}

impl Handler for Redirect {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move { ctx.redirect(StatusCode::MOVED_PERMANENTLY, &self.location) })
    }
}

struct StaticFilesHandler {
    files: StaticFiles,
}

impl Handler for StaticFilesHandler {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let rest = format!("/{}", ctx.params().wildcard().unwrap_or(""));
            self.files.serve(ctx, &rest).await;
        })
    }
}

fn trim_prefix(prefix: &str) -> String {
    prefix.trim().trim_matches('/').to_string()
}

/// Percent-decodes a request path for matching. Paths that do not decode
/// to UTF-8 are matched as sent.
fn decode_path(raw: &str) -> String {
    urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |p| p.into_owned())
}

/// The redirect target for a trailing-slash path, if one may be issued.
///
/// Backslashes (raw or encoded) and targets starting with `//` are refused
/// since browsers may read them as another host.
fn trailing_slash_target(path: &str, query: Option<&str>) -> Option<String> {
    if path.len() <= 1 || !path.ends_with('/') {
        return None;
    }
    if path.contains('\\') || path.contains("%5c") || path.contains("%5C") {
        return None;
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with("//") {
        return None;
    }
    Some(match query {
        Some(q) if !q.is_empty() => format!("{trimmed}?{q}"),
        _ => trimmed.to_string(),
    })
}
