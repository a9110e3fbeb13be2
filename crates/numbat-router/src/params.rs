//! Matched path parameters.
//!
//! Most routes capture at most a handful of parameters, so values are kept
//! inline in a small vector and only spill to the heap for long patterns.

use smallvec::SmallVec;

/// Name under which an anonymous `*` wildcard stores its capture.
pub const WILDCARD_KEY: &str = "*";

const INLINE_PARAMS: usize = 4;

/// Ordered `name -> value` pairs captured while matching a request path.
///
/// A fresh set is produced for every lookup; nothing is shared between
/// requests.
///
/// # Example
///
/// ```rust
/// use numbat_router::Params;
///
/// let mut params = Params::new();
/// params.push("id", "42");
/// params.push("*", "a/b/c");
///
/// assert_eq!(params.get("id"), Some("42"));
/// assert_eq!(params.wildcard(), Some("a/b/c"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Params {
    inner: SmallVec<[(String, String); INLINE_PARAMS]>,
}

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a captured value.
    ///
    /// A name captured twice keeps the latest value visible through
    /// [`Params::get`].
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(slot) = self.inner.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.inner.push((name, value));
        }
    }

    /// Returns the value captured under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the capture of an anonymous `*` wildcard.
    #[must_use]
    pub fn wildcard(&self) -> Option<&str> {
        self.get(WILDCARD_KEY)
    }

    /// Returns true if a value was captured under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(n, _)| n == name)
    }

    /// Returns true if nothing was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the number of captured values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Iterates captures in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Applies `f` to every captured value, in place.
    ///
    /// The dispatcher uses this to percent-decode captures after matching.
    pub fn map_values(&mut self, mut f: impl FnMut(&str) -> String) {
        for (_, value) in &mut self.inner {
            *value = f(value);
        }
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a str, &'a str);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, String)>,
        fn(&'a (String, String)) -> (&'a str, &'a str),
    >;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.push(name, value);
        }
        params
    }
}
