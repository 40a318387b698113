//! axum adapter for the HOTP strategy.
//!
//! [`HotpGuard`] reads the request body (bounded), decodes body and query
//! into [`RequestValue`] trees, runs the strategy with the principal an
//! earlier layer stored in the request extensions, and hands the rebuilt
//! request on. Wrong or missing codes become `401`, anything that prevents
//! a verdict becomes `500`.

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, request::Parts, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use passhotp_strategy::strategy::form::parse_urlencoded;
use passhotp_strategy::strategy::{AuthOutcome, AuthRequest, PropertyMap, RequestValue, Strategy};
use std::sync::Arc;

/// Largest request body the guard will buffer.
pub const DEFAULT_BODY_LIMIT: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum RequestDataError {
    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),

    #[error("malformed JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed form data: {0}")]
    Form(#[from] serde_urlencoded::de::Error),

    #[error("form body is not UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
}

impl IntoResponse for RequestDataError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

/// Decoded submission sources of one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestData {
    pub body: Option<RequestValue>,
    pub query: Option<RequestValue>,
}

/// Properties returned by the resync collaborator, available to handlers
/// behind the guard as a request extension.
#[derive(Debug, Clone, Default)]
pub struct VerifiedProperties(pub PropertyMap);

/// Decode body (by content type) and query string.
///
/// JSON and urlencoded bodies are understood; any other content type, or an
/// empty body, yields no body source.
pub fn request_data(parts: &Parts, body: &[u8]) -> Result<RequestData, RequestDataError> {
    let query = parts.uri.query().map(parse_urlencoded).transpose()?;

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .unwrap_or_default();

    let body = if body.is_empty() {
        None
    } else if content_type == "application/json" || content_type.ends_with("+json") {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        RequestValue::from_json(value)
    } else if content_type == "application/x-www-form-urlencoded" {
        Some(parse_urlencoded(std::str::from_utf8(body)?)?)
    } else {
        None
    };

    Ok(RequestData { body, query })
}

/// Runs a strategy in front of axum handlers.
pub struct HotpGuard<S> {
    strategy: Arc<S>,
    body_limit: usize,
}

impl<S> Clone for HotpGuard<S> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy.clone(),
            body_limit: self.body_limit,
        }
    }
}

impl<S> HotpGuard<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy: Arc::new(strategy),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Authenticate `request`, principal type `P` read from its extensions.
    ///
    /// On success the request is returned with its body restored and a
    /// [`VerifiedProperties`] extension attached. Otherwise the error
    /// response to send instead.
    pub async fn authenticate<P>(&self, request: Request) -> Result<Request, Response>
    where
        S: Strategy<P>,
        P: Clone + Send + Sync + 'static,
    {
        let (mut parts, body) = request.into_parts();
        let bytes: Bytes = axum::body::to_bytes(body, self.body_limit)
            .await
            .map_err(|e| RequestDataError::Body(e).into_response())?;
        let data = request_data(&parts, &bytes).map_err(IntoResponse::into_response)?;

        let auth_request = AuthRequest {
            principal: parts.extensions.get::<P>().cloned(),
            body: data.body,
            query: data.query,
        };

        match self.strategy.authenticate(&auth_request).await {
            AuthOutcome::Success { properties, .. } => {
                tracing::debug!(strategy = self.strategy.name(), "one-time code accepted");
                parts
                    .extensions
                    .insert(VerifiedProperties(properties.unwrap_or_default()));
                Ok(Request::from_parts(parts, Body::from(bytes)))
            }
            AuthOutcome::Fail(reason) => {
                tracing::info!(strategy = self.strategy.name(), %reason, "one-time code rejected");
                Err((StatusCode::UNAUTHORIZED, reason.to_string()).into_response())
            }
            AuthOutcome::Error(e) => {
                tracing::error!(strategy = self.strategy.name(), error = %e, "authentication error");
                Err((StatusCode::INTERNAL_SERVER_ERROR, "authentication unavailable").into_response())
            }
        }
    }
}

/// Middleware body for `axum::middleware::from_fn_with_state`.
///
/// ```ignore
/// let guard = HotpGuard::new(strategy);
/// let app = Router::new()
///     .route("/verify", post(handler))
///     .layer(from_fn_with_state(guard, require_hotp::<MyStrategy, String>));
/// ```
pub async fn require_hotp<S, P>(
    State(guard): State<HotpGuard<S>>,
    request: Request,
    next: Next,
) -> Response
where
    S: Strategy<P> + 'static,
    P: Clone + Send + Sync + 'static,
{
    match guard.authenticate::<P>(request).await {
        Ok(request) => next.run(request).await,
        Err(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passhotp_strategy::strategy::{HotpStrategy, MemoryKeyStore, SecretKey, StrategyConfig};

    const RFC_KEY: &[u8] = b"12345678901234567890";

    fn parts(uri: &str, content_type: Option<&str>) -> Parts {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header(header::CONTENT_TYPE, ct);
        }
        builder.body(()).unwrap().into_parts().0
    }

    // ── request_data ─────────────────────────────────────────────

    #[test]
    fn json_body_and_query() {
        let p = parts("/login?code=111111", Some("application/json; charset=utf-8"));
        let data = request_data(&p, br#"{"otp":{"code":"222222"}}"#).unwrap();
        let body = data.body.unwrap();
        assert_eq!(
            body.get("otp").and_then(|o| o.get("code")).and_then(|c| c.as_str()),
            Some("222222")
        );
        assert_eq!(
            data.query.unwrap().get("code").and_then(|c| c.as_str()),
            Some("111111")
        );
    }

    #[test]
    fn form_body_nested() {
        let p = parts("/login", Some("application/x-www-form-urlencoded"));
        let data = request_data(&p, b"otp%5Bcode%5D=012345").unwrap();
        assert!(data.query.is_none());
        let body = data.body.unwrap();
        assert_eq!(
            body.get("otp").and_then(|o| o.get("code")).and_then(|c| c.as_str()),
            Some("012345")
        );
    }

    #[test]
    fn unknown_content_type_has_no_body() {
        let p = parts("/login", Some("text/plain"));
        assert_eq!(request_data(&p, b"code=1").unwrap(), RequestData::default());
        let p = parts("/login", None);
        assert_eq!(request_data(&p, b"").unwrap(), RequestData::default());
    }

    #[test]
    fn malformed_json_is_error() {
        let p = parts("/login", Some("application/json"));
        let err = request_data(&p, b"{oops").unwrap_err();
        assert!(matches!(err, RequestDataError::Json(_)));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    // ── HotpGuard ────────────────────────────────────────────────

    async fn guard(counter: u64) -> HotpGuard<HotpStrategy<Arc<MemoryKeyStore<String>>, Arc<MemoryKeyStore<String>>>> {
        let store = Arc::new(MemoryKeyStore::new());
        store
            .insert("alice".to_string(), SecretKey::new(RFC_KEY.to_vec()), counter)
            .await;
        let config = StrategyConfig::default().with_window(5);
        HotpGuard::new(HotpStrategy::with_config(config, store.clone(), store))
    }

    fn login(body: &str, principal: Option<&str>) -> Request {
        let mut request = Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        if let Some(p) = principal {
            request.extensions_mut().insert(p.to_string());
        }
        request
    }

    #[tokio::test]
    async fn accepted_code_passes_request_through() {
        let guard = guard(0).await;
        let code = passhotp_engine::hotp::generate(RFC_KEY, 2).unwrap();
        let body = format!(r#"{{"code":"{}"}}"#, code);

        let request = guard
            .authenticate::<String>(login(&body, Some("alice")))
            .await
            .unwrap();

        assert!(request.extensions().get::<VerifiedProperties>().is_some());
        let restored = axum::body::to_bytes(request.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(restored, body.as_bytes());
    }

    #[tokio::test]
    async fn wrong_code_is_unauthorized() {
        let guard = guard(0).await;
        let response = guard
            .authenticate::<String>(login(r#"{"code":"000000"}"#, Some("alice")))
            .await
            .unwrap_err();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_code_is_unauthorized() {
        let guard = guard(0).await;
        let response = guard
            .authenticate::<String>(login("{}", Some("alice")))
            .await
            .unwrap_err();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_principal_is_server_error() {
        let guard = guard(0).await;
        let response = guard
            .authenticate::<String>(login(r#"{"code":"755224"}"#, Some("mallory")))
            .await
            .unwrap_err();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn oversized_body_is_bad_request() {
        let guard = guard(0).await.with_body_limit(8);
        let response = guard
            .authenticate::<String>(login(r#"{"code":"755224","pad":"xxxxxxxx"}"#, Some("alice")))
            .await
            .unwrap_err();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
