//! Error payloads and routing outcomes.

use std::collections::BTreeMap;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The JSON error body used by the default handlers and built-in middleware.
///
/// Empty optional fields are omitted when serialized, so the smallest form
/// is `{"error":"not found"}`.
///
/// # Example
///
/// ```rust
/// use numbat_core::ErrorResponse;
///
/// let body = ErrorResponse::new("validation failed")
///     .with_message("name is required")
///     .with_detail("field", "name");
///
/// let json = serde_json::to_string(&body).unwrap();
/// assert_eq!(
///     json,
///     r#"{"error":"validation failed","message":"name is required","details":{"field":"name"}}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short, stable error text.
    pub error: String,

    /// Human-readable explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Application-specific error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Extra key/value context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl ErrorResponse {
    /// Creates an error body with only the `error` field set.
    #[must_use]
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::default()
        }
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Adds a detail entry.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Why the dispatcher could not route a request.
///
/// Passed to a custom error hook so it can tell the two cases apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum RoutingError {
    /// No route serves the path.
    #[error("not found")]
    NotFound,
    /// The path exists but not for this method.
    #[error("method not allowed")]
    MethodNotAllowed,
}

impl RoutingError {
    /// The HTTP status for this outcome.
    #[must_use]
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}
