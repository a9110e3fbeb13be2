//! The hyper HTTP/1 server.
//!
//! One tokio task serves each connection. Request bodies are collected up
//! to the configured limit before dispatch, so handlers always see a
//! complete body; an oversized body is answered with 413 without reaching
//! the router.
//!
//! Shutdown stops the accept loop, asks every connection to finish its
//! in-flight request, and waits up to the shutdown timeout for them.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use numbat_core::{Context, ErrorResponse};
use tokio::net::{TcpListener, TcpStream};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::router::Router;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

/// The response type produced for every request.
pub type HttpResponse = Response<Full<Bytes>>;

/// Serves a [`Router`] over HTTP/1.1.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use numbat_server::{Router, Server, ServerConfig};
///
/// # async fn run() -> Result<(), numbat_server::ServerError> {
/// let router = Arc::new(Router::new());
/// let config = ServerConfig::builder().addr("127.0.0.1:8080").build();
/// Server::new(config, router).run().await
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
}

impl Server {
    /// Creates a server for `router`.
    #[must_use]
    pub fn new(config: ServerConfig, router: Arc<Router>) -> Self {
        Self { config, router }
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The dispatcher being served.
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Binds the configured address and serves until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is invalid or cannot be
    /// bound.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Binds the configured address and serves until `shutdown` triggers.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is invalid or cannot be
    /// bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = self.config.socket_addr().map_err(|e| {
            ServerError::Bind(format!("invalid address '{}': {e}", self.config.addr()))
        })?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(format!("failed to bind to {addr}: {e}")))?;
        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener until `shutdown`
    /// triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener address cannot be read.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, "server listening");

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();
        let stop = shutdown.recv();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, remote) = match result {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            tracing::error!(error = %err, "failed to accept connection");
                            continue;
                        }
                    };
                    if let Some(max) = server.config.max_connections() {
                        if tracker.active_connections() >= max {
                            tracing::warn!(%remote, max, "connection limit reached, dropping connection");
                            continue;
                        }
                    }

                    let token = tracker.acquire();
                    let server = Arc::clone(&server);
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(err) = server.handle_connection(stream, remote, shutdown).await {
                            tracing::debug!(%remote, error = %err, "connection error");
                        }
                        drop(token);
                    });
                }
                () = &mut stop => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        let timeout = server.config.shutdown_timeout();
        tracing::info!(
            active = tracker.active_connections(),
            timeout_secs = timeout.as_secs_f64(),
            "draining connections"
        );
        tokio::select! {
            () = tracker.wait_for_idle() => tracing::info!("all connections closed"),
            () = tokio::time::sleep(timeout) => tracing::warn!(
                active = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            ),
        }

        tracing::info!("server stopped");
        Ok(())
    }

    async fn handle_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let router = Arc::clone(&self.router);
        let max_body = self.config.max_body_size();
        let service = service_fn(move |req: Request<Incoming>| {
            let router = Arc::clone(&router);
            async move { Ok::<_, Infallible>(handle_request(&router, req, remote, max_body).await) }
        });

        let mut builder = http1::Builder::new();
        builder.timer(TokioTimer::new()).keep_alive(self.config.keep_alive());
        if let Some(timeout) = self.config.header_read_timeout() {
            builder.header_read_timeout(timeout);
        }
        let conn = builder.serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                tracing::debug!(%remote, "closing connection for shutdown");
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }
}

/// Collects the body of `req`, dispatches it through `router` and returns
/// the finished response.
pub async fn handle_request(
    router: &Router,
    req: Request<Incoming>,
    remote: SocketAddr,
    max_body: usize,
) -> HttpResponse {
    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, max_body).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            tracing::debug!(%remote, limit = max_body, "request body over limit");
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large");
        }
        Err(err) => {
            tracing::debug!(%remote, error = %err, "failed to read request body");
            return error_response(StatusCode::BAD_REQUEST, "bad request");
        }
    };

    let mut ctx = Context::from_parts(parts, body).with_remote_addr(remote);
    router.dispatch(&mut ctx).await;
    ctx.into_response()
}

fn error_response(status: StatusCode, error: &str) -> HttpResponse {
    let body = serde_json::to_vec(&ErrorResponse::new(error)).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    response
}
