//! Per-node method table.

use http::Method;

/// Maps HTTP methods to registered values for a single trie node.
///
/// Entries keep registration order, which is also the order reported by
/// [`MethodRouter::allowed_methods`].
///
/// # Example
///
/// ```rust
/// use numbat_router::MethodRouter;
/// use http::Method;
///
/// let mut methods = MethodRouter::new();
/// methods.insert(Method::GET, "list");
/// methods.insert(Method::POST, "create");
///
/// assert_eq!(methods.get(&Method::GET), Some(&"list"));
/// assert_eq!(methods.resolve(&Method::HEAD), Some(&"list"));
/// assert_eq!(methods.get(&Method::DELETE), None);
/// ```
#[derive(Debug, Clone)]
pub struct MethodRouter<T> {
    entries: Vec<(Method, T)>,
}

impl<T> Default for MethodRouter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MethodRouter<T> {
    /// Creates an empty method table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers `value` for `method`, returning the value it replaced.
    pub fn insert(&mut self, method: Method, value: T) -> Option<T> {
        if let Some(slot) = self.entries.iter_mut().find(|(m, _)| *m == method) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((method, value));
        None
    }

    /// Returns the value registered for exactly `method`.
    #[must_use]
    pub fn get(&self, method: &Method) -> Option<&T> {
        self.entries
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, v)| v)
    }

    /// Returns the value that should serve `method`.
    ///
    /// An explicit registration wins. A HEAD request with no HEAD
    /// registration is served by the GET value.
    #[must_use]
    pub fn resolve(&self, method: &Method) -> Option<&T> {
        self.get(method).or_else(|| {
            if *method == Method::HEAD {
                self.get(&Method::GET)
            } else {
                None
            }
        })
    }

    /// Returns the methods this node can serve, including implicit HEAD.
    #[must_use]
    pub fn allowed_methods(&self) -> Vec<Method> {
        let mut methods: Vec<Method> = self.entries.iter().map(|(m, _)| m.clone()).collect();
        if self.get(&Method::GET).is_some() && self.get(&Method::HEAD).is_none() {
            methods.push(Method::HEAD);
        }
        methods
    }

    /// Returns true if no method is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of registered methods.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_router_new_is_empty() {
        let methods: MethodRouter<&str> = MethodRouter::new();
        assert!(methods.is_empty());
        assert!(methods.allowed_methods().is_empty());
    }

    #[test]
    fn test_method_router_insert_replaces() {
        let mut methods = MethodRouter::new();
        assert_eq!(methods.insert(Method::GET, "first"), None);
        assert_eq!(methods.insert(Method::GET, "second"), Some("first"));
        assert_eq!(methods.get(&Method::GET), Some(&"second"));
        assert_eq!(methods.len(), 1);
    }

    #[test]
    fn test_method_router_head_falls_back_to_get() {
        let mut methods = MethodRouter::new();
        methods.insert(Method::GET, "get");
        assert_eq!(methods.resolve(&Method::HEAD), Some(&"get"));
        assert_eq!(methods.get(&Method::HEAD), None);
    }

    #[test]
    fn test_method_router_explicit_head_wins() {
        let mut methods = MethodRouter::new();
        methods.insert(Method::GET, "get");
        methods.insert(Method::HEAD, "head");
        assert_eq!(methods.resolve(&Method::HEAD), Some(&"head"));
    }

    #[test]
    fn test_method_router_no_fallback_for_other_methods() {
        let mut methods = MethodRouter::new();
        methods.insert(Method::GET, "get");
        assert_eq!(methods.resolve(&Method::POST), None);
        assert_eq!(methods.resolve(&Method::OPTIONS), None);
    }

    #[test]
    fn test_method_router_allowed_methods() {
        let mut methods = MethodRouter::new();
        methods.insert(Method::POST, "post");
        methods.insert(Method::GET, "get");

        assert_eq!(
            methods.allowed_methods(),
            vec![Method::POST, Method::GET, Method::HEAD]
        );
    }

    #[test]
    fn test_method_router_extension_method() {
        let purge = Method::from_bytes(b"PURGE").unwrap();
        let mut methods = MethodRouter::new();
        methods.insert(purge.clone(), "purge");
        assert_eq!(methods.get(&purge), Some(&"purge"));
    }
}
