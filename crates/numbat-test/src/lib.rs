//! # Numbat Test
//!
//! In-memory testing for Numbat routers. Requests run through the full
//! dispatch path (global, group and route middleware, 404/405 handling,
//! trailing-slash redirects) without binding a port.
//!
//! ## Key Features
//!
//! - **Request Builder**: fluent headers, JSON and form bodies
//! - **Response Assertions**: chainable status, header and body checks
//! - **Full Middleware**: the same chain a live server runs
//!
//! ## Example
//!
//! ```rust
//! use numbat_core::handler_fn;
//! use numbat_server::Router;
//! use numbat_test::TestClient;
//! use http::StatusCode;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let router = Router::new();
//! router.post("/users", handler_fn(|ctx| Box::pin(async move {
//!     ctx.json(StatusCode::CREATED, &json!({"id": 1}));
//! })));
//!
//! let client = TestClient::new(router);
//! client
//!     .post("/users")
//!     .json(&json!({"name": "Alice"}))
//!     .send()
//!     .await
//!     .assert_status(StatusCode::CREATED)
//!     .assert_json(&json!({"id": 1}));
//! # });
//! ```

#![doc(html_root_url = "https://docs.rs/numbat-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::{TestRequest, TestRequestBuilder};
pub use response::TestResponse;
