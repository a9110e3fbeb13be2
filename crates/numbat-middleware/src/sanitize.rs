//! Redaction of request fields before they reach the logs.
//!
//! A [`Sanitizer`] is built once from a [`SanitizeConfig`] and reused for
//! every request. It masks path parameter values, query parameter values
//! and header values by name.

use std::collections::HashSet;

use http::header::HeaderName;
use http::{HeaderMap, HeaderValue};
use numbat_core::Params;
use serde::Deserialize;

const DEFAULT_MASK: &str = "***";

/// Names of the fields to redact.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SanitizeConfig {
    /// Path parameter names, without the `:` prefix.
    pub params: Vec<String>,
    /// Query parameter names.
    pub query_params: Vec<String>,
    /// Header names, matched case-insensitively.
    pub headers: Vec<String>,
    /// Replacement text. Empty means `***`.
    pub mask: String,
}

impl Default for SanitizeConfig {
    fn default() -> Self {
        Self {
            params: Vec::new(),
            query_params: Vec::new(),
            headers: Vec::new(),
            mask: DEFAULT_MASK.to_string(),
        }
    }
}

/// Reusable redactor for log output.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    mask: String,
    params: HashSet<String>,
    query: HashSet<String>,
    headers: Vec<HeaderName>,
}

impl Sanitizer {
    /// Builds a sanitizer, or `None` when there is nothing to redact.
    ///
    /// Header names that are not valid HTTP header names are ignored.
    #[must_use]
    pub fn new(config: &SanitizeConfig) -> Option<Self> {
        let params: HashSet<String> = config.params.iter().cloned().collect();
        let query: HashSet<String> = config.query_params.iter().cloned().collect();
        let mut headers: Vec<HeaderName> = config
            .headers
            .iter()
            .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok())
            .collect();
        headers.dedup();

        if params.is_empty() && query.is_empty() && headers.is_empty() {
            return None;
        }

        let mask = if config.mask.is_empty() {
            DEFAULT_MASK.to_string()
        } else {
            config.mask.clone()
        };

        Some(Self {
            mask,
            params,
            query,
            headers,
        })
    }

    /// The replacement text.
    pub fn mask(&self) -> &str {
        &self.mask
    }

    /// Replaces every path segment equal to the value of a redacted
    /// parameter.
    ///
    /// ```rust
    /// use numbat_core::Params;
    /// use numbat_middleware::{SanitizeConfig, Sanitizer};
    ///
    /// let sanitizer = Sanitizer::new(&SanitizeConfig {
    ///     params: vec!["token".into()],
    ///     ..SanitizeConfig::default()
    /// })
    /// .unwrap();
    ///
    /// let params: Params = [("token", "s3cr3t")].into_iter().collect();
    /// assert_eq!(sanitizer.path("/reset/s3cr3t", &params), "/reset/***");
    /// ```
    #[must_use]
    pub fn path(&self, path: &str, params: &Params) -> String {
        if self.params.is_empty() {
            return path.to_string();
        }

        let values: HashSet<&str> = self
            .params
            .iter()
            .filter_map(|name| params.get(name))
            .filter(|value| !value.is_empty())
            .collect();
        if values.is_empty() {
            return path.to_string();
        }

        path.split('/')
            .map(|segment| {
                if values.contains(segment) {
                    self.mask.as_str()
                } else {
                    segment
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Masks the values of redacted keys in a raw query string.
    ///
    /// Pair order is preserved. The input is returned unchanged when no
    /// redacted key is present.
    #[must_use]
    pub fn query(&self, raw: &str) -> String {
        if self.query.is_empty() || raw.is_empty() {
            return raw.to_string();
        }

        let mut changed = false;
        let pairs: Vec<String> = raw
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let key = pair.split_once('=').map_or(pair, |(k, _)| k);
                if self.query.contains(key) {
                    changed = true;
                    format!("{key}={}", self.mask)
                } else {
                    pair.to_string()
                }
            })
            .collect();

        if changed {
            pairs.join("&")
        } else {
            raw.to_string()
        }
    }

    /// Returns a copy of `headers` with redacted values masked, or `None`
    /// when no header names are configured.
    #[must_use]
    pub fn headers(&self, headers: &HeaderMap) -> Option<HeaderMap> {
        if self.headers.is_empty() {
            return None;
        }

        let mut clone = headers.clone();
        let mask = HeaderValue::from_str(&self.mask)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_MASK));
        for name in &self.headers {
            let count = clone.get_all(name).iter().count();
            if count == 0 {
                continue;
            }
            clone.remove(name);
            for _ in 0..count {
                clone.append(name.clone(), mask.clone());
            }
        }
        Some(clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sanitizer(params: &[&str], query: &[&str], headers: &[&str]) -> Sanitizer {
        Sanitizer::new(&SanitizeConfig {
            params: params.iter().map(ToString::to_string).collect(),
            query_params: query.iter().map(ToString::to_string).collect(),
            headers: headers.iter().map(ToString::to_string).collect(),
            mask: String::new(),
        })
        .unwrap()
    }

    #[test]
    fn test_empty_config_builds_nothing() {
        assert!(Sanitizer::new(&SanitizeConfig::default()).is_none());
    }

    #[test]
    fn test_empty_mask_falls_back() {
        assert_eq!(sanitizer(&["id"], &[], &[]).mask(), "***");
    }

    #[test]
    fn test_path_masks_param_value() {
        let s = sanitizer(&["token"], &[], &[]);
        let params: Params = [("user", "ann"), ("token", "abc123")].into_iter().collect();
        assert_eq!(s.path("/users/ann/reset/abc123", &params), "/users/ann/reset/***");
    }

    #[test]
    fn test_path_masks_every_matching_segment() {
        let s = sanitizer(&["id"], &[], &[]);
        let params: Params = [("id", "7")].into_iter().collect();
        assert_eq!(s.path("/a/7/b/7", &params), "/a/***/b/***");
    }

    #[test]
    fn test_path_unchanged_without_values() {
        let s = sanitizer(&["token"], &[], &[]);
        let params: Params = [("token", "")].into_iter().collect();
        assert_eq!(s.path("/reset/", &params), "/reset/");
        assert_eq!(s.path("/x", &Params::new()), "/x");
    }

    #[test]
    fn test_query_masks_and_keeps_order() {
        let s = sanitizer(&[], &["key", "sig"], &[]);
        assert_eq!(
            s.query("a=1&key=secret&b=2&sig=zz&key=other"),
            "a=1&key=***&b=2&sig=***&key=***"
        );
    }

    #[test]
    fn test_query_unchanged_when_nothing_matches() {
        let s = sanitizer(&[], &["key"], &[]);
        assert_eq!(s.query("a=1&&b"), "a=1&&b");
        assert_eq!(s.query(""), "");
    }

    #[test]
    fn test_query_key_without_value() {
        let s = sanitizer(&[], &["flag"], &[]);
        assert_eq!(s.query("flag&x=1"), "flag=***&x=1");
    }

    #[test]
    fn test_headers_masked_case_insensitive() {
        let s = sanitizer(&[], &[], &["Authorization", "X-Api-Key"]);
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer t"));
        headers.append("x-api-key", HeaderValue::from_static("k1"));
        headers.append("x-api-key", HeaderValue::from_static("k2"));
        headers.insert("accept", HeaderValue::from_static("*/*"));

        let masked = s.headers(&headers).unwrap();
        assert_eq!(masked["authorization"], "***");
        let keys: Vec<_> = masked.get_all("x-api-key").iter().collect();
        assert_eq!(keys, vec!["***", "***"]);
        assert_eq!(masked["accept"], "*/*");
        assert_eq!(headers["authorization"], "Bearer t");
    }

    #[test]
    fn test_headers_none_without_config() {
        let s = sanitizer(&["id"], &[], &[]);
        assert!(s.headers(&HeaderMap::new()).is_none());
    }
}
