//! Segment trie.
//!
//! Each node owns one path segment. Literal children are kept sorted so
//! lookup can binary search them; a node has at most one parameter child
//! and at most one wildcard child.

use http::Method;

use crate::error::RouteError;
use crate::method_router::MethodRouter;
use crate::params::{Params, WILDCARD_KEY};

/// Kind of a trie segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SegmentKind {
    /// Literal text, e.g. `users`.
    Static,
    /// Named parameter, e.g. `:id`. Holds the name without the marker.
    Param(String),
    /// Trailing capture, `*` or `*name`. Holds the key the capture is
    /// stored under.
    Wildcard(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Node<T> {
    segment: String,
    kind: SegmentKind,
    methods: MethodRouter<T>,
    static_children: Vec<Node<T>>,
    param_child: Option<Box<Node<T>>>,
    wildcard_child: Option<Box<Node<T>>>,
}

/// Splits a path into its non-empty segments.
///
/// Repeated separators collapse, so `//a//b/` yields `a`, `b`.
pub(crate) fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn parse_pattern(pattern: &str) -> Result<Vec<(String, SegmentKind)>, RouteError> {
    if !pattern.starts_with('/') {
        return Err(RouteError::NotRooted(pattern.to_string()));
    }

    let raw: Vec<&str> = split_path(pattern).collect();
    let last = raw.len().saturating_sub(1);
    let mut segments = Vec::with_capacity(raw.len());

    for (i, seg) in raw.into_iter().enumerate() {
        let kind = if let Some(name) = seg.strip_prefix(':') {
            if name.is_empty() {
                return Err(RouteError::EmptyParamName(pattern.to_string()));
            }
            SegmentKind::Param(name.to_string())
        } else if let Some(name) = seg.strip_prefix('*') {
            if i != last {
                return Err(RouteError::WildcardNotLast(pattern.to_string()));
            }
            let key = if name.is_empty() { WILDCARD_KEY } else { name };
            SegmentKind::Wildcard(key.to_string())
        } else {
            SegmentKind::Static
        };
        segments.push((seg.to_string(), kind));
    }

    Ok(segments)
}

impl<T> Node<T> {
    fn new(segment: impl Into<String>, kind: SegmentKind) -> Self {
        Self {
            segment: segment.into(),
            kind,
            methods: MethodRouter::new(),
            static_children: Vec::new(),
            param_child: None,
            wildcard_child: None,
        }
    }

    pub(crate) fn root() -> Self {
        Self::new("", SegmentKind::Static)
    }

    /// Registers `value` for `method` at `pattern`.
    ///
    /// Returns the value previously registered for the same method and
    /// pattern, if any.
    pub(crate) fn insert(
        &mut self,
        method: Method,
        pattern: &str,
        value: T,
    ) -> Result<Option<T>, RouteError> {
        let segments = parse_pattern(pattern)?;
        self.insert_segments(&segments, method, value)
    }

    fn insert_segments(
        &mut self,
        segments: &[(String, SegmentKind)],
        method: Method,
        value: T,
    ) -> Result<Option<T>, RouteError> {
        let Some(((segment, kind), rest)) = segments.split_first() else {
            return Ok(self.methods.insert(method, value));
        };

        match kind {
            SegmentKind::Static => {
                let idx = match self
                    .static_children
                    .binary_search_by(|c| c.segment.as_str().cmp(segment))
                {
                    Ok(idx) => idx,
                    Err(idx) => {
                        self.static_children
                            .insert(idx, Node::new(segment.clone(), SegmentKind::Static));
                        idx
                    }
                };
                self.static_children[idx].insert_segments(rest, method, value)
            }
            SegmentKind::Param(name) => {
                if let Some(child) = &self.param_child {
                    if let SegmentKind::Param(existing) = &child.kind {
                        if existing != name {
                            return Err(RouteError::ConflictingParam {
                                name: name.clone(),
                                existing: existing.clone(),
                            });
                        }
                    }
                }
                self.param_child
                    .get_or_insert_with(|| Box::new(Node::new(segment.clone(), kind.clone())))
                    .insert_segments(rest, method, value)
            }
            SegmentKind::Wildcard(name) => {
                if let Some(child) = &self.wildcard_child {
                    if let SegmentKind::Wildcard(existing) = &child.kind {
                        if existing != name {
                            return Err(RouteError::ConflictingWildcard {
                                name: name.clone(),
                                existing: existing.clone(),
                            });
                        }
                    }
                }
                self.wildcard_child
                    .get_or_insert_with(|| Box::new(Node::new(segment.clone(), kind.clone())))
                    .insert_segments(rest, method, value)
            }
        }
    }

    /// Walks the trie for `path`.
    ///
    /// At each level a literal child is preferred, then the parameter
    /// child, then the wildcard child. The walk never backtracks: once a
    /// literal child is taken, a failure deeper down is a miss even if the
    /// parameter sibling would have matched. A node with no registered
    /// methods counts as a miss.
    pub(crate) fn find(&self, path: &str) -> Option<(&MethodRouter<T>, Params)> {
        let parts: Vec<&str> = split_path(path).collect();
        let mut node = self;
        let mut params = Params::new();

        for (i, part) in parts.iter().enumerate() {
            if let Some(child) = node.find_static_child(part) {
                node = child;
            } else if let Some(child) = node.param_child.as_deref() {
                if let SegmentKind::Param(name) = &child.kind {
                    params.push(name.as_str(), *part);
                }
                node = child;
            } else if let Some(child) = node.wildcard_child.as_deref() {
                if let SegmentKind::Wildcard(key) = &child.kind {
                    params.push(key.as_str(), parts[i..].join("/"));
                }
                node = child;
                break;
            } else {
                return None;
            }
        }

        if node.methods.is_empty() {
            None
        } else {
            Some((&node.methods, params))
        }
    }

    fn find_static_child(&self, segment: &str) -> Option<&Node<T>> {
        self.static_children
            .binary_search_by(|c| c.segment.as_str().cmp(segment))
            .ok()
            .map(|i| &self.static_children[i])
    }
}
