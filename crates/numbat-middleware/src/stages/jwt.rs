//! JWT bearer authentication.
//!
//! Validates `Authorization: Bearer <token>` headers. On success the
//! token's claims are stored as [`JwtClaims`] in the request extensions.
//! Failures answer `401` with an RFC 6750 `WWW-Authenticate` header and a
//! JSON body `{"error":"unauthorized","message":"..."}`.
//!
//! Accepted algorithms: HS256, HS384, HS512, RS256, RS384, RS512, ES256
//! and EdDSA. `exp` and `nbf` are checked when present, with a leeway of
//! 30 seconds by default.
//!
//! ## Example
//!
//! ```rust
//! use numbat_middleware::stages::{JwtAuth, JwtConfig};
//!
//! let auth = JwtAuth::new(
//!     JwtConfig::hmac(b"change-me")
//!         .issuer("https://issuer.example")
//!         .audience("orders"),
//! );
//! # let _ = auth;
//! ```

use std::sync::Arc;
use std::time::Duration;

use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use http::{HeaderValue, StatusCode};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};
use numbat_core::{BoxFuture, Context, ErrorResponse};
use serde_json::{Map, Value};

use crate::{Middleware, Next};

const ALLOWED_ALGORITHMS: &[Algorithm] = &[
    Algorithm::HS256,
    Algorithm::HS384,
    Algorithm::HS512,
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::ES256,
    Algorithm::EdDSA,
];

const DEFAULT_LEEWAY: Duration = Duration::from_secs(30);

/// Resolves the verification key for a token from its header.
pub type KeyResolver = Arc<dyn Fn(&Header) -> Result<DecodingKey, String> + Send + Sync>;

/// Claims of a validated token, stored in the request extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct JwtClaims(pub Map<String, Value>);

impl JwtClaims {
    /// Reads the claims of the current request.
    pub fn from_context(ctx: &Context) -> Option<&Self> {
        ctx.extensions().get::<Self>()
    }

    /// A single claim.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// The `sub` claim, when it is a string.
    pub fn subject(&self) -> Option<&str> {
        self.0.get("sub").and_then(Value::as_str)
    }
}

/// JWT validation settings.
#[derive(Clone)]
pub struct JwtConfig {
    key: KeyResolver,
    issuer: Option<String>,
    audience: Option<String>,
    leeway: Duration,
    optional: bool,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("key", &"<resolver>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("leeway", &self.leeway)
            .field("optional", &self.optional)
            .finish()
    }
}

impl JwtConfig {
    /// Creates a configuration with a custom key resolver.
    pub fn new<F>(resolver: F) -> Self
    where
        F: Fn(&Header) -> Result<DecodingKey, String> + Send + Sync + 'static,
    {
        Self {
            key: Arc::new(resolver),
            issuer: None,
            audience: None,
            leeway: DEFAULT_LEEWAY,
            optional: false,
        }
    }

    /// Creates a configuration verifying HMAC tokens with a shared secret.
    #[must_use]
    pub fn hmac(secret: &[u8]) -> Self {
        let key = DecodingKey::from_secret(secret);
        Self::new(move |_| Ok(key.clone()))
    }

    /// Requires the `iss` claim to equal `issuer`.
    #[must_use]
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Requires the `aud` claim to contain `audience`.
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Clock skew tolerated on `exp` and `nbf`. Zero restores the default of
    /// 30 seconds.
    #[must_use]
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.leeway = if leeway.is_zero() {
            DEFAULT_LEEWAY
        } else {
            leeway
        };
        self
    }

    /// Lets requests without an `Authorization` header through.
    #[must_use]
    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }
}

/// JWT bearer authentication middleware.
#[derive(Debug, Clone)]
pub struct JwtAuth {
    config: JwtConfig,
}

impl JwtAuth {
    /// Creates the middleware.
    #[must_use]
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }

    fn verify(&self, token: &str) -> Result<Map<String, Value>, String> {
        let header = decode_header(token).map_err(verify_failed)?;
        if !ALLOWED_ALGORITHMS.contains(&header.alg) {
            return Err(verify_failed(format!(
                "signing method {:?} is invalid",
                header.alg
            )));
        }
        let key = (self.config.key)(&header).map_err(verify_failed)?;

        let mut validation = Validation::new(header.alg);
        validation.leeway = self.config.leeway.as_secs();
        validation.required_spec_claims.clear();
        validation.validate_nbf = true;
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer]);
            validation.required_spec_claims.insert("iss".to_string());
        }
        match &self.config.audience {
            Some(audience) => {
                validation.set_audience(&[audience]);
                validation.required_spec_claims.insert("aud".to_string());
            }
            None => validation.validate_aud = false,
        }

        decode::<Map<String, Value>>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(verify_failed)
    }
}

fn verify_failed(err: impl std::fmt::Display) -> String {
    format!("token parse/verify failed: {err}")
}

/// Escapes a value for a quoted `WWW-Authenticate` parameter.
fn escape_auth_param(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .fold(String::with_capacity(s.len()), |mut out, c| {
            if c == '\\' || c == '"' {
                out.push('\\');
            }
            out.push(c);
            out
        })
}

fn unauthorized(ctx: &mut Context, description: &str) {
    let challenge = format!(
        "Bearer error=\"invalid_token\", error_description=\"{}\"",
        escape_auth_param(description)
    );
    let value = HeaderValue::from_str(&challenge)
        .unwrap_or_else(|_| HeaderValue::from_static("Bearer error=\"invalid_token\""));
    ctx.response_headers_mut().insert(WWW_AUTHENTICATE, value);
    ctx.json(
        StatusCode::UNAUTHORIZED,
        &ErrorResponse::new("unauthorized").with_message(description),
    );
}

impl Middleware for JwtAuth {
    fn name(&self) -> &'static str {
        "jwt"
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let authorization = ctx
                .header(AUTHORIZATION.as_str())
                .filter(|v| !v.is_empty())
                .map(str::to_owned);

            let Some(authorization) = authorization else {
                if self.config.optional {
                    next.run(ctx).await;
                } else {
                    unauthorized(ctx, "missing Authorization header");
                }
                return;
            };

            let token = match authorization.split_once(' ') {
                Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() => {
                    token
                }
                _ => {
                    unauthorized(ctx, "invalid Authorization scheme");
                    return;
                }
            };

            match self.verify(token) {
                Ok(claims) => {
                    ctx.extensions_mut().insert(JwtClaims(claims));
                    next.run(ctx).await;
                }
                Err(description) => {
                    tracing::debug!(error = %description, "bearer token rejected");
                    unauthorized(ctx, &description);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{request, run_one};
    use http::Request;
    use http_body_util::BodyExt;
    use jsonwebtoken::{encode, EncodingKey};
    use numbat_core::handler_fn;
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    const SECRET: &[u8] = b"test-secret";

    fn now() -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
    }

    fn mint(claims: &Value, alg: Algorithm) -> String {
        encode(&Header::new(alg), claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn echo_subject() -> impl numbat_core::Handler {
        handler_fn(|ctx| {
            Box::pin(async move {
                let sub = JwtClaims::from_context(ctx)
                    .and_then(JwtClaims::subject)
                    .unwrap_or("anonymous")
                    .to_string();
                ctx.text(StatusCode::OK, sub);
            })
        })
    }

    async fn call(auth: JwtAuth, authorization: Option<&str>) -> Context {
        let mut builder = Request::get("/me");
        if let Some(value) = authorization {
            builder = builder.header(AUTHORIZATION, value);
        }
        let mut ctx = request(builder, b"");
        run_one(auth, echo_subject(), &mut ctx).await;
        ctx
    }

    async fn body(ctx: Context) -> Value {
        let bytes = ctx.into_response().into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_valid_token_exposes_claims() {
        let token = mint(&json!({"sub": "ann", "exp": now() + 60}), Algorithm::HS256);
        let ctx = call(JwtAuth::new(JwtConfig::hmac(SECRET)), Some(&format!("Bearer {token}"))).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::OK));
        let bytes = ctx.into_response().into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"ann");
    }

    #[tokio::test]
    async fn test_scheme_is_case_insensitive() {
        let token = mint(&json!({"sub": "bo"}), Algorithm::HS384);
        let ctx = call(JwtAuth::new(JwtConfig::hmac(SECRET)), Some(&format!("bearer {token}"))).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_missing_header() {
        let ctx = call(JwtAuth::new(JwtConfig::hmac(SECRET)), None).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::UNAUTHORIZED));
        assert_eq!(
            ctx.response_headers()[WWW_AUTHENTICATE],
            r#"Bearer error="invalid_token", error_description="missing Authorization header""#
        );
        assert_eq!(
            body(ctx).await,
            json!({"error": "unauthorized", "message": "missing Authorization header"})
        );
    }

    #[tokio::test]
    async fn test_optional_passes_without_header() {
        let ctx = call(JwtAuth::new(JwtConfig::hmac(SECRET).optional(true)), None).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_optional_still_rejects_bad_token() {
        let ctx = call(
            JwtAuth::new(JwtConfig::hmac(SECRET).optional(true)),
            Some("Bearer nope"),
        )
        .await;
        assert_eq!(ctx.status_code(), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_wrong_scheme() {
        for value in ["Basic abc", "Bearer", "Bearer ", "token"] {
            let ctx = call(JwtAuth::new(JwtConfig::hmac(SECRET)), Some(value)).await;
            assert_eq!(ctx.status_code(), Some(StatusCode::UNAUTHORIZED), "{value}");
            assert_eq!(body(ctx).await["message"], "invalid Authorization scheme");
        }
    }

    #[tokio::test]
    async fn test_bad_signature() {
        let token = encode(
            &Header::new(Algorithm::HS256),
            &json!({"sub": "mallory"}),
            &EncodingKey::from_secret(b"other"),
        )
        .unwrap();
        let ctx = call(JwtAuth::new(JwtConfig::hmac(SECRET)), Some(&format!("Bearer {token}"))).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::UNAUTHORIZED));
        let message = body(ctx).await["message"].as_str().unwrap().to_string();
        assert!(message.starts_with("token parse/verify failed: "));
    }

    #[tokio::test]
    async fn test_expired_beyond_leeway() {
        let token = mint(&json!({"sub": "ann", "exp": now() - 120}), Algorithm::HS256);
        let ctx = call(JwtAuth::new(JwtConfig::hmac(SECRET)), Some(&format!("Bearer {token}"))).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_expired_within_leeway() {
        let token = mint(&json!({"sub": "ann", "exp": now() - 10}), Algorithm::HS256);
        let ctx = call(JwtAuth::new(JwtConfig::hmac(SECRET)), Some(&format!("Bearer {token}"))).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_issuer_and_audience() {
        let auth = || JwtAuth::new(JwtConfig::hmac(SECRET).issuer("iss-a").audience("api"));

        let good = mint(&json!({"sub": "x", "iss": "iss-a", "aud": "api"}), Algorithm::HS256);
        let ctx = call(auth(), Some(&format!("Bearer {good}"))).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::OK));

        let wrong_iss = mint(&json!({"sub": "x", "iss": "iss-b", "aud": "api"}), Algorithm::HS256);
        let ctx = call(auth(), Some(&format!("Bearer {wrong_iss}"))).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::UNAUTHORIZED));

        let wrong_aud = mint(&json!({"sub": "x", "iss": "iss-a", "aud": "web"}), Algorithm::HS256);
        let ctx = call(auth(), Some(&format!("Bearer {wrong_aud}"))).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::UNAUTHORIZED));

        let no_aud = mint(&json!({"sub": "x", "iss": "iss-a"}), Algorithm::HS256);
        let ctx = call(auth(), Some(&format!("Bearer {no_aud}"))).await;
        assert_eq!(ctx.status_code(), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_resolver_error_is_reported() {
        let auth = JwtAuth::new(JwtConfig::new(|header: &Header| {
            Err(format!("unknown kid {:?}", header.kid))
        }));
        let token = mint(&json!({"sub": "x"}), Algorithm::HS256);
        let ctx = call(auth, Some(&format!("Bearer {token}"))).await;
        assert_eq!(
            body(ctx).await["message"],
            "token parse/verify failed: unknown kid None"
        );
    }

    #[test]
    fn test_escape_auth_param() {
        assert_eq!(escape_auth_param("a\"b\\c\r\nd"), "a\\\"b\\\\cd");
    }

    #[test]
    fn test_debug_hides_resolver() {
        let debug = format!("{:?}", JwtConfig::hmac(SECRET));
        assert!(debug.contains("<resolver>"));
        assert!(!debug.contains("test-secret"));
    }
}
