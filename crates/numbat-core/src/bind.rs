//! Request binding: JSON bodies, query strings and urlencoded forms.

use http::header::CONTENT_TYPE;
use http::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::Context;

/// Default cap on bytes decoded by [`Context::bind_json`]: 10 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 << 20;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Errors produced while binding request data.
#[derive(Debug, Error)]
pub enum BindError {
    /// The body is not valid JSON for the target type.
    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// The query string or form body does not fit the target type.
    #[error("invalid form data: {0}")]
    Form(#[from] serde_urlencoded::de::Error),

    /// The body exceeds the configured limit.
    #[error("request body of {actual} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit in bytes.
        limit: usize,
        /// Actual body length in bytes.
        actual: usize,
    },
}

impl BindError {
    /// The status a handler would usually answer with.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Json(_) | Self::Form(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl Context {
    /// Decodes the body as JSON.
    ///
    /// Bodies larger than [`Context::max_body_size`] are rejected without
    /// being parsed. Put `#[serde(deny_unknown_fields)]` on the target type
    /// to reject unexpected keys.
    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        let limit = self.max_body_size();
        let body = self.body();
        if body.len() > limit {
            return Err(BindError::PayloadTooLarge {
                limit,
                actual: body.len(),
            });
        }
        Ok(serde_json::from_slice(body)?)
    }

    /// Decodes the query string.
    ///
    /// ```rust
    /// use numbat_core::Context;
    /// use bytes::Bytes;
    /// use http::Request;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct Page {
    ///     page: u32,
    ///     q: Option<String>,
    /// }
    ///
    /// let req = Request::get("/search?page=2").body(Bytes::new()).unwrap();
    /// let ctx = Context::new(req);
    /// let page: Page = ctx.bind_query().unwrap();
    /// assert_eq!(page.page, 2);
    /// assert!(page.q.is_none());
    /// ```
    pub fn bind_query<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        Ok(serde_urlencoded::from_str(self.uri().query().unwrap_or(""))?)
    }

    /// Decodes an `application/x-www-form-urlencoded` body.
    ///
    /// Requests with another content type are decoded from the query string
    /// instead.
    pub fn bind_form<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        if self.is_form() {
            Ok(serde_urlencoded::from_bytes(self.body())?)
        } else {
            self.bind_query()
        }
    }

    /// Returns a form value, looking in a urlencoded body first and then in
    /// the query string.
    #[must_use]
    pub fn form_value(&self, key: &str) -> Option<String> {
        if self.is_form() {
            let pairs: Vec<(String, String)> =
                serde_urlencoded::from_bytes(self.body()).unwrap_or_else(|err| {
                    tracing::debug!(error = %err, "form parse error");
                    Vec::new()
                });
            if let Some((_, v)) = pairs.into_iter().find(|(k, _)| k == key) {
                return Some(v);
            }
        }
        self.query(key)
    }

    fn is_form(&self) -> bool {
        self.header(CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with(FORM_CONTENT_TYPE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::Request;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Todo {
        title: String,
        done: bool,
    }

    fn post(uri: &str, content_type: &str, body: &'static str) -> Context {
        let req = Request::post(uri)
            .header(CONTENT_TYPE, content_type)
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap();
        Context::new(req)
    }

    #[test]
    fn test_bind_json() {
        let ctx = post("/", "application/json", r#"{"title":"milk","done":false}"#);
        let todo: Todo = ctx.bind_json().unwrap();
        assert_eq!(
            todo,
            Todo {
                title: "milk".into(),
                done: false
            }
        );
    }

    #[test]
    fn test_bind_json_rejects_unknown_fields() {
        let ctx = post("/", "application/json", r#"{"title":"x","done":true,"extra":1}"#);
        let err = ctx.bind_json::<Todo>().unwrap_err();
        assert!(matches!(err, BindError::Json(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_bind_json_over_limit() {
        let mut ctx = post("/", "application/json", r#"{"title":"milk","done":false}"#);
        ctx.set_max_body_size(8);
        let err = ctx.bind_json::<Todo>().unwrap_err();
        assert!(matches!(
            err,
            BindError::PayloadTooLarge { limit: 8, actual: 29 }
        ));
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Filter {
        name: String,
        age: u8,
        active: Option<bool>,
    }

    #[test]
    fn test_bind_query() {
        let req = Request::get("/users?name=ann&age=31&active=true")
            .body(Bytes::new())
            .unwrap();
        let filter: Filter = Context::new(req).bind_query().unwrap();
        assert_eq!(filter.name, "ann");
        assert_eq!(filter.age, 31);
        assert_eq!(filter.active, Some(true));
    }

    #[test]
    fn test_bind_query_type_error() {
        let req = Request::get("/users?name=ann&age=old")
            .body(Bytes::new())
            .unwrap();
        let err = Context::new(req).bind_query::<Filter>().unwrap_err();
        assert!(matches!(err, BindError::Form(_)));
    }

    #[test]
    fn test_bind_form_body() {
        let ctx = post(
            "/",
            "application/x-www-form-urlencoded; charset=utf-8",
            "name=bo&age=4",
        );
        let filter: Filter = ctx.bind_form().unwrap();
        assert_eq!(filter.name, "bo");
        assert_eq!(filter.active, None);
    }

    #[test]
    fn test_form_value_body_then_query() {
        let ctx = post(
            "/?a=query&b=query",
            "application/x-www-form-urlencoded",
            "a=body",
        );
        assert_eq!(ctx.form_value("a").as_deref(), Some("body"));
        assert_eq!(ctx.form_value("b").as_deref(), Some("query"));
        assert_eq!(ctx.form_value("c"), None);
    }
}
