//! Public matcher API.

use http::Method;

use crate::error::RouteError;
use crate::method_router::MethodRouter;
use crate::node::Node;
use crate::params::Params;

/// Outcome of resolving a method and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a, T> {
    /// A value is registered for this method (or GET, for HEAD requests).
    Matched {
        /// The registered value.
        value: &'a T,
        /// Captured path parameters.
        params: Params,
    },
    /// The path exists but the method is not registered on it.
    MethodNotAllowed {
        /// Methods that are registered on the path.
        allowed: Vec<Method>,
    },
    /// No route serves the path.
    NotFound,
}

/// A segment trie mapping `(method, path pattern)` to values.
///
/// Patterns are `/`-separated. A segment starting with `:` is a named
/// parameter; `*` or `*name` as the final segment captures the rest of the
/// path, stored under `*` or `name` respectively.
///
/// # Example
///
/// ```rust
/// use numbat_router::{PathMatcher, Resolution};
/// use http::Method;
///
/// let mut matcher = PathMatcher::new();
/// matcher.insert(Method::GET, "/users/:id", "get_user").unwrap();
/// matcher.insert(Method::GET, "/static/*", "assets").unwrap();
///
/// match matcher.resolve(&Method::GET, "/users/42") {
///     Resolution::Matched { value, params } => {
///         assert_eq!(*value, "get_user");
///         assert_eq!(params.get("id"), Some("42"));
///     }
///     other => panic!("unexpected {other:?}"),
/// }
///
/// assert!(matches!(
///     matcher.resolve(&Method::POST, "/users/42"),
///     Resolution::MethodNotAllowed { .. }
/// ));
/// assert_eq!(matcher.resolve(&Method::GET, "/nope"), Resolution::NotFound);
/// ```
#[derive(Debug, Clone)]
pub struct PathMatcher<T> {
    root: Node<T>,
    route_count: usize,
}

impl<T> Default for PathMatcher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PathMatcher<T> {
    /// Creates an empty matcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::root(),
            route_count: 0,
        }
    }

    /// Registers `value` for `method` at `pattern`.
    ///
    /// Registering the same method and pattern twice replaces the earlier
    /// value and returns it.
    ///
    /// # Errors
    ///
    /// Returns a [`RouteError`] for malformed patterns and for parameter or
    /// wildcard names that conflict with an existing registration at the
    /// same position.
    pub fn insert(
        &mut self,
        method: Method,
        pattern: &str,
        value: T,
    ) -> Result<Option<T>, RouteError> {
        let previous = self.root.insert(method, pattern, value)?;
        if previous.is_none() {
            self.route_count += 1;
        }
        Ok(previous)
    }

    /// Finds the method table serving `path`, with captured parameters.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<(&MethodRouter<T>, Params)> {
        self.root.find(path)
    }

    /// Resolves `method` and `path` to a value, a 405 or a 404 outcome.
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str) -> Resolution<'_, T> {
        let Some((methods, params)) = self.find(path) else {
            return Resolution::NotFound;
        };
        match methods.resolve(method) {
            Some(value) => Resolution::Matched { value, params },
            None => Resolution::MethodNotAllowed {
                allowed: methods.allowed_methods(),
            },
        }
    }

    /// Returns the number of distinct `(method, pattern)` registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.route_count
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }
}
