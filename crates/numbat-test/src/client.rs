//! In-memory test client.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use numbat_server::Router;
use serde::Serialize;

use crate::error::TestError;
use crate::request::{TestRequest, TestRequestBuilder};
use crate::response::TestResponse;

/// Drives a [`Router`] without sockets.
///
/// Each request becomes a [`Context`](numbat_core::Context), goes through
/// [`Router::dispatch`] with all global, group and route middleware, and
/// comes back as a collected [`TestResponse`].
///
/// ```rust
/// use numbat_core::handler_fn;
/// use numbat_server::Router;
/// use numbat_test::TestClient;
/// use http::StatusCode;
///
/// # tokio_test::block_on(async {
/// let router = Router::new();
/// router.get("/ping", handler_fn(|ctx| Box::pin(async move {
///     ctx.text(StatusCode::OK, "pong");
/// })));
///
/// let client = TestClient::new(router);
/// client.get("/ping").send().await.assert_body_eq("pong");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct TestClient {
    router: Arc<Router>,
    default_headers: Vec<(String, String)>,
    remote_addr: Option<SocketAddr>,
}

impl TestClient {
    /// Creates a client for `router`.
    pub fn new(router: Router) -> Self {
        Self::from_shared(Arc::new(router))
    }

    /// Creates a client for a shared router.
    pub fn from_shared(router: Arc<Router>) -> Self {
        Self {
            router,
            default_headers: Vec::new(),
            remote_addr: None,
        }
    }

    /// The router under test.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Adds a header to every request.
    #[must_use]
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Reports `addr` as the peer of every request.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::GET, uri)
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::POST, uri)
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PUT, uri)
    }

    /// Starts a PATCH request.
    pub fn patch(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::PATCH, uri)
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::DELETE, uri)
    }

    /// Starts a HEAD request.
    pub fn head(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::HEAD, uri)
    }

    /// Starts an OPTIONS request.
    pub fn options(&self, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        self.request(Method::OPTIONS, uri)
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_> {
        let mut builder = TestRequestBuilder::new(method, uri);
        for (name, value) in &self.default_headers {
            builder = builder.header(name, value);
        }
        if let Some(addr) = self.remote_addr {
            builder = builder.remote_addr(addr);
        }
        TestClientRequest {
            client: self,
            builder,
        }
    }

    /// Dispatches a built request.
    ///
    /// # Errors
    ///
    /// Fails if the request cannot be turned into a context.
    pub async fn execute(&self, request: TestRequest) -> Result<TestResponse, TestError> {
        let mut ctx = request.into_context()?;
        self.router.dispatch(&mut ctx).await;
        Ok(TestResponse::from_response(ctx.into_response()).await)
    }
}

/// A request bound to a [`TestClient`].
#[derive(Debug)]
pub struct TestClientRequest<'a> {
    client: &'a TestClient,
    builder: TestRequestBuilder,
}

impl TestClientRequest<'_> {
    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets the `Content-Type` header.
    #[must_use]
    pub fn content_type(mut self, content_type: impl AsRef<str>) -> Self {
        self.builder = self.builder.content_type(content_type);
        self
    }

    /// Sets `Authorization: Bearer <token>`.
    #[must_use]
    pub fn bearer_token(mut self, token: impl AsRef<str>) -> Self {
        self.builder = self.builder.bearer_token(token);
        self
    }

    /// Sets the raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Sets a urlencoded form body.
    #[must_use]
    pub fn form<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        self.builder = self.builder.form(value);
        self
    }

    /// Overrides the peer address.
    #[must_use]
    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.builder = self.builder.remote_addr(addr);
        self
    }

    /// Sends the request.
    ///
    /// # Panics
    ///
    /// Panics if the request is invalid; use
    /// [`try_send`](Self::try_send) to get the error instead.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(err) => panic!("test request failed: {err}"),
        }
    }

    /// Sends the request, returning build errors.
    ///
    /// # Errors
    ///
    /// Fails if a header, body or the URI is invalid.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        self.client.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use numbat_core::handler_fn;

    fn echo_router() -> Router {
        let router = Router::new();
        router.any(
            "/echo",
            handler_fn(|ctx| {
                Box::pin(async move {
                    let body = serde_json::json!({
                        "method": ctx.method().as_str(),
                        "trace": ctx.header("x-trace"),
                        "peer": ctx.remote_addr().map(|a| a.to_string()),
                        "body": String::from_utf8_lossy(ctx.body()),
                    });
                    ctx.json(StatusCode::OK, &body);
                })
            }),
        );
        router
    }

    #[tokio::test]
    async fn test_default_headers_and_peer() {
        let client = TestClient::new(echo_router())
            .with_default_header("x-trace", "t-1")
            .with_remote_addr("192.0.2.1:4000".parse().unwrap());
        let value: serde_json::Value = client.post("/echo").body("hi").send().await.json().unwrap();
        assert_eq!(value["method"], "POST");
        assert_eq!(value["trace"], "t-1");
        assert_eq!(value["peer"], "192.0.2.1:4000");
        assert_eq!(value["body"], "hi");
    }

    #[tokio::test]
    async fn test_not_found_through_client() {
        let client = TestClient::new(Router::new());
        client
            .get("/missing")
            .send()
            .await
            .assert_status(StatusCode::NOT_FOUND)
            .assert_json(&serde_json::json!({"error": "not found"}));
    }

    #[tokio::test]
    async fn test_try_send_reports_invalid_header() {
        let client = TestClient::new(echo_router());
        let err = client
            .get("/echo")
            .header("bad header", "x")
            .try_send()
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::InvalidHeader(_)));
    }
}
