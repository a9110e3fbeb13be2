//! Test error types.

use thiserror::Error;

/// Errors raised while building requests or reading responses.
#[derive(Debug, Error)]
pub enum TestError {
    /// The request could not be built.
    #[error("request build error: {0}")]
    RequestBuild(String),

    /// A header name or value is invalid.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Form encoding failed.
    #[error("form error: {0}")]
    Form(#[from] serde_urlencoded::ser::Error),

    /// The response body is not UTF-8.
    #[error("body is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}
