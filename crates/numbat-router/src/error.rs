//! Route registration errors.

use thiserror::Error;

/// Errors raised while registering a route pattern.
///
/// These are startup errors: a router that fails to register a pattern has
/// ambiguous or malformed routing intent and should not serve traffic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// The pattern does not begin with `/`.
    #[error("path must start with '/': {0:?}")]
    NotRooted(String),

    /// A second, differently named parameter was registered at a position
    /// that already has a parameter child.
    #[error("conflicting param name ':{name}', existing ':{existing}'")]
    ConflictingParam {
        /// The parameter name being registered.
        name: String,
        /// The parameter name already present at this position.
        existing: String,
    },

    /// A second, differently named wildcard was registered at a position
    /// that already has a wildcard child.
    #[error("conflicting wildcard name '*{name}', existing '*{existing}'")]
    ConflictingWildcard {
        /// The wildcard name being registered.
        name: String,
        /// The wildcard name already present at this position.
        existing: String,
    },

    /// A wildcard segment appears before the end of the pattern.
    #[error("wildcard must be the last segment: {0:?}")]
    WildcardNotLast(String),

    /// A `:` parameter marker with no name.
    #[error("empty parameter name in pattern {0:?}")]
    EmptyParamName(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflicting_param_message_names_both() {
        let err = RouteError::ConflictingParam {
            name: "userId".to_string(),
            existing: "id".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains(":userId"));
        assert!(msg.contains(":id"));
    }

    #[test]
    fn test_not_rooted_message() {
        let err = RouteError::NotRooted("users".to_string());
        assert_eq!(err.to_string(), "path must start with '/': \"users\"");
    }
}
