//! # Numbat Server
//!
//! The dispatcher and its transport:
//!
//! - [`Router`] / [`Group`] - route registration, middleware and dispatch
//! - [`StaticFiles`] - directory and single-file serving
//! - [`Server`] - hyper HTTP/1.1 serving with graceful shutdown
//! - [`ShutdownSignal`] / [`ConnectionTracker`] - shutdown coordination
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use numbat_core::handler_fn;
//! use numbat_middleware::stages::{Logger, Recover};
//! use numbat_server::{Router, Server, ServerConfig};
//! use http::StatusCode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Arc::new(Router::new());
//!     router.use_middleware(Logger::new()).use_middleware(Recover::new());
//!     router.get("/hello", handler_fn(|ctx| Box::pin(async move {
//!         ctx.text(StatusCode::OK, "hello");
//!     })));
//!
//!     Server::new(ServerConfig::default(), router).run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/numbat-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod router;
mod server;
mod shutdown;
pub mod static_files;

pub use config::{
    ServerConfig, ServerConfigBuilder, DEFAULT_ADDR, DEFAULT_HEADER_READ_TIMEOUT_SECS,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
pub use error::ServerError;
pub use router::{ErrorHook, Group, Router, ANY_METHODS};
pub use server::{handle_request, HttpResponse, Server};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
pub use static_files::{StaticFileError, StaticFiles};
