//! # Numbat Core
//!
//! Core types shared by every Numbat crate:
//!
//! - [`Context`] - per-request state, request accessors and response helpers
//! - [`Handler`] - terminal request processor, plus [`handler_fn`]
//! - [`ResponseWriter`] - the response sink, stackable by middleware
//! - [`ErrorResponse`] - the standard JSON error body
//! - [`RoutingError`] - not-found / method-not-allowed outcomes
//! - [`BindError`] - JSON, query and form binding failures

#![doc(html_root_url = "https://docs.rs/numbat-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod bind;
mod context;
mod cookie;
mod error;
mod handler;
mod writer;

pub use bind::{BindError, DEFAULT_MAX_BODY_SIZE};
pub use context::{Context, RequestId};
pub use cookie::{Cookie, SameSite};
pub use error::{ErrorResponse, RoutingError};
pub use handler::{handler_fn, BoxFuture, Handler, HandlerFn};
pub use numbat_router::Params;
pub use writer::{is_bodyless, ResponseBuffer, ResponseWriter, Unwrapped};
