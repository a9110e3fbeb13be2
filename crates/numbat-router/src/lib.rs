//! Segment trie path matching for Numbat.
//!
//! This crate maps `(method, path)` pairs to values of any type. It knows
//! nothing about handlers or HTTP bodies; the dispatcher in `numbat-server`
//! stores handlers in it.
//!
//! # Pattern syntax
//!
//! - `users`: literal segment
//! - `:id`: named parameter, captures one segment
//! - `*` / `*path`: trailing wildcard, captures the rest of the path
//!   including separators (stored under `*` or `path`)
//!
//! # Matching
//!
//! Request paths are split on `/` with empty segments dropped. At each level
//! a literal child is preferred over the parameter child, which is preferred
//! over the wildcard child. The walk is greedy and never backtracks.
//!
//! ```text
//!                 (root)
//!                   │
//!          ┌────────┴────────┐
//!        "users"          "static"
//!     [GET,POST]             │
//!          │                "*"
//!        ":id"             [GET]
//!        [GET]
//! ```
//!
//! # Example
//!
//! ```rust
//! use numbat_router::PathMatcher;
//! use http::Method;
//!
//! let mut matcher = PathMatcher::new();
//! matcher.insert(Method::GET, "/users/:id", 1).unwrap();
//!
//! let (methods, params) = matcher.find("/users/42").unwrap();
//! assert_eq!(methods.get(&Method::GET), Some(&1));
//! assert_eq!(params.get("id"), Some("42"));
//! ```

mod error;
mod matcher;
mod method_router;
mod node;
mod params;

pub use error::RouteError;
pub use matcher::{PathMatcher, Resolution};
pub use method_router::MethodRouter;
pub use params::{Params, WILDCARD_KEY};
