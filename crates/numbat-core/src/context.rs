//! Per-request context.
//!
//! The [`Context`] carries the request, the matched path parameters and the
//! response writer stack through the middleware chain and into the handler.

use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use http::header::{HeaderName, CONTENT_TYPE, LOCATION, SET_COOKIE};
use http::request::Parts;
use http::{Extensions, HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri, Version};
use http_body_util::Full;
use numbat_router::Params;
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::bind::DEFAULT_MAX_BODY_SIZE;
use crate::cookie::{find_cookie, Cookie};
use crate::writer::{ResponseBuffer, ResponseWriter, Unwrapped};

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Correlation identifier for a request.
///
/// Taken from an incoming `X-Request-Id` header when present, otherwise a
/// time-ordered UUID v7.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Generates a fresh UUID v7 identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-request state handed to middleware and handlers.
///
/// Request data is read through accessors such as [`param`](Self::param),
/// [`query`](Self::query) and [`header`](Self::header). The response is
/// written with the helpers [`json`](Self::json), [`text`](Self::text),
/// [`bytes`](Self::bytes) and [`status`](Self::status). These are
/// write-once: after the first of them commits a response, later calls are
/// no-ops.
///
/// # Example
///
/// ```rust
/// use numbat_core::Context;
/// use bytes::Bytes;
/// use http::{Request, StatusCode};
///
/// let req = Request::get("/hello?name=ada").body(Bytes::new()).unwrap();
/// let mut ctx = Context::new(req);
///
/// let name = ctx.query("name").unwrap_or_default();
/// ctx.text(StatusCode::OK, format!("hello {name}"));
/// ctx.text(StatusCode::IM_A_TEAPOT, "ignored");
///
/// let response = ctx.into_response();
/// assert_eq!(response.status(), StatusCode::OK);
/// ```
pub struct Context {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    params: Params,
    status: Option<StatusCode>,
    wrote: bool,
    writer: Box<dyn ResponseWriter>,
    extensions: Extensions,
    deadline: Option<Instant>,
    max_body_size: usize,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("remote_addr", &self.remote_addr)
            .field("params", &self.params)
            .field("status", &self.status)
            .field("wrote", &self.wrote)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Creates a context from a request whose body is already collected.
    #[must_use]
    pub fn new(request: Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::from_parts(parts, body)
    }

    /// Creates a context from request parts and a collected body.
    ///
    /// Request extensions carry over to [`Context::extensions`].
    #[must_use]
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            body,
            remote_addr: None,
            params: Params::new(),
            status: None,
            wrote: false,
            writer: Box::new(ResponseBuffer::new()),
            extensions: parts.extensions,
            deadline: None,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Sets the peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    // ----- request side -----

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request path, without the query string.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// HTTP version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a request header as text, if present and valid.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Collected request body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Peer address, if known.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Matched path parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Replaces the matched path parameters.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Returns a path parameter, e.g. `id` for a `:id` segment.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Returns the first query value for `key`, percent-decoded.
    pub fn query(&self, key: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns every query pair in order, percent-decoded.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let raw = self.uri.query().unwrap_or("");
        serde_urlencoded::from_str(raw).unwrap_or_default()
    }

    /// Returns a request cookie, percent-decoded.
    pub fn cookie(&self, name: &str) -> Option<String> {
        find_cookie(&self.headers, name)
    }

    /// Request-scoped values shared between middleware and handlers.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Mutable request-scoped values.
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// The request id recorded by the logging middleware, if any.
    pub fn request_id(&self) -> Option<&str> {
        self.extensions.get::<RequestId>().map(RequestId::as_str)
    }

    /// Maximum body size honoured by [`bind_json`](Self::bind_json).
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    /// Sets the body size limit. Zero restores the default.
    pub fn set_max_body_size(&mut self, limit: usize) {
        self.max_body_size = if limit == 0 {
            DEFAULT_MAX_BODY_SIZE
        } else {
            limit
        };
    }

    // ----- deadline -----

    /// The cooperative deadline for this request, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Replaces the deadline, returning the previous one.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) -> Option<Instant> {
        std::mem::replace(&mut self.deadline, deadline)
    }

    /// True once the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// A future that completes when the deadline passes.
    ///
    /// Without a deadline it never completes, so it can always sit in a
    /// `select!` next to the real work.
    pub fn done(&self) -> impl Future<Output = ()> + Send + 'static {
        let deadline = self.deadline;
        async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        }
    }

    // ----- response side -----

    /// True once a response helper has committed a response.
    pub fn written(&self) -> bool {
        self.wrote
    }

    /// The committed status, if any.
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status
    }

    /// Response headers.
    pub fn response_headers(&self) -> &HeaderMap {
        self.writer.headers()
    }

    /// Mutable response headers.
    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        self.writer.headers_mut()
    }

    /// Sets a response header, replacing existing values. Invalid names or
    /// values are dropped with a debug log.
    pub fn set_header(&mut self, name: &str, value: &str) {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.writer.headers_mut().insert(name, value);
            }
            _ => tracing::debug!(header = name, "invalid response header dropped"),
        }
    }

    /// Appends a `Set-Cookie` header.
    pub fn set_cookie(&mut self, cookie: &Cookie) {
        match HeaderValue::from_str(&cookie.to_header_value()) {
            Ok(value) => {
                self.writer.headers_mut().append(SET_COOKIE, value);
            }
            Err(_) => tracing::debug!(cookie = cookie.name(), "invalid cookie dropped"),
        }
    }

    /// Writes only a status. Write-once.
    pub fn status(&mut self, status: StatusCode) {
        if self.wrote {
            return;
        }
        self.commit(status);
    }

    /// Writes `204 No Content`.
    pub fn no_content(&mut self) {
        self.status(StatusCode::NO_CONTENT);
    }

    /// Sets `Location` and writes a redirect status. Write-once.
    pub fn redirect(&mut self, status: StatusCode, location: &str) {
        if self.wrote {
            return;
        }
        match HeaderValue::from_str(location) {
            Ok(value) => {
                self.writer.headers_mut().insert(LOCATION, value);
                self.commit(status);
            }
            Err(_) => {
                tracing::warn!(location, "invalid redirect location");
                self.commit(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    /// Serializes `value` as JSON with `status`. Write-once.
    ///
    /// If serialization fails the response becomes a bare 500.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) {
        if self.wrote {
            return;
        }
        match serde_json::to_vec(value) {
            Ok(body) => self.send(status, Some(JSON_CONTENT_TYPE), &body),
            Err(err) => {
                tracing::error!(error = %err, "JSON encoding failed");
                self.commit(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    /// Writes a plain-text body. Write-once.
    pub fn text(&mut self, status: StatusCode, body: impl AsRef<str>) {
        if self.wrote {
            return;
        }
        self.send(status, Some(TEXT_CONTENT_TYPE), body.as_ref().as_bytes());
    }

    /// Writes raw bytes with an optional content type. Write-once.
    pub fn bytes(&mut self, status: StatusCode, body: &[u8], content_type: Option<&str>) {
        if self.wrote {
            return;
        }
        self.send(status, content_type, body);
    }

    /// Appends body bytes directly to the writer stack.
    ///
    /// Unlike the helpers this is not write-once; it is meant for streaming
    /// after [`status`](Self::status). A write with no status commits 200.
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if !self.wrote {
            self.commit(StatusCode::OK);
        }
        self.writer.write(data)
    }

    /// Flushes the writer stack.
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn send(&mut self, status: StatusCode, content_type: Option<&str>, body: &[u8]) {
        if let Some(ct) = content_type {
            match HeaderValue::from_str(ct) {
                Ok(value) => {
                    self.writer.headers_mut().insert(CONTENT_TYPE, value);
                }
                Err(_) => tracing::debug!(content_type = ct, "invalid content type dropped"),
            }
        }
        self.commit(status);
        if let Err(err) = self.writer.write(body) {
            tracing::debug!(error = %err, "response write error");
        }
    }

    fn commit(&mut self, status: StatusCode) {
        self.status = Some(status);
        self.writer.write_head(status);
        self.wrote = true;
    }

    // ----- writer stack -----

    /// Pushes a writer layer on top of the current one.
    ///
    /// ```rust
    /// use numbat_core::{Context, ResponseWriter, Unwrapped};
    /// use bytes::Bytes;
    /// use http::{HeaderMap, Request, StatusCode};
    /// use std::io;
    ///
    /// struct Upper(Box<dyn ResponseWriter>);
    ///
    /// impl ResponseWriter for Upper {
    ///     fn headers(&self) -> &HeaderMap { self.0.headers() }
    ///     fn headers_mut(&mut self) -> &mut HeaderMap { self.0.headers_mut() }
    ///     fn write_head(&mut self, s: StatusCode) { self.0.write_head(s) }
    ///     fn write(&mut self, d: &[u8]) -> io::Result<()> {
    ///         self.0.write(&d.to_ascii_uppercase())
    ///     }
    ///     fn flush(&mut self) -> io::Result<()> { self.0.flush() }
    ///     fn into_inner(self: Box<Self>) -> Unwrapped { Unwrapped::Inner(self.0) }
    /// }
    ///
    /// let mut ctx = Context::new(Request::new(Bytes::new()));
    /// ctx.wrap_writer(|inner| Box::new(Upper(inner)));
    /// ctx.text(StatusCode::OK, "quiet");
    /// ctx.unwrap_writer().unwrap();
    /// ```
    pub fn wrap_writer<F>(&mut self, wrap: F)
    where
        F: FnOnce(Box<dyn ResponseWriter>) -> Box<dyn ResponseWriter>,
    {
        let inner = std::mem::replace(&mut self.writer, Box::new(ResponseBuffer::new()));
        self.writer = wrap(inner);
    }

    /// Finishes and pops the top writer layer.
    ///
    /// Popping the base buffer is a no-op. The layer is popped even when
    /// finishing it fails; the error is returned afterwards.
    pub fn unwrap_writer(&mut self) -> io::Result<()> {
        let mut top = std::mem::replace(&mut self.writer, Box::new(ResponseBuffer::new()));
        let finished = top.finish();
        self.writer = match top.into_inner() {
            Unwrapped::Inner(inner) => inner,
            Unwrapped::Base(base) => Box::new(base),
        };
        finished
    }

    /// Finishes every writer layer and builds the HTTP response.
    ///
    /// HEAD requests get the headers and `Content-Length` of the full
    /// response with an empty body.
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let head_only = self.method == Method::HEAD;
        let mut writer = self.writer;
        loop {
            if let Err(err) = writer.finish() {
                tracing::warn!(error = %err, "failed to finish response writer");
            }
            match writer.into_inner() {
                Unwrapped::Inner(inner) => writer = inner,
                Unwrapped::Base(base) => return base.into_response(head_only),
            }
        }
    }
}
