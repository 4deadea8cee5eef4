//! HTTP client core: a transport with two extension points. Pre-send hooks may
//! decorate a request; a single post-receive hook sees every outcome (success or
//! error) and decides whether the caller gets it or the request is sent again.
//! The core itself never retries, times out, or interprets auth failures; those
//! belong to the hooks and the transport.

pub mod cookies;
pub mod transport;

pub use cookies::CookieJar;
pub use transport::ReqwestTransport;

use crate::error::{ApiError, ErrorEnvelope};
use async_trait::async_trait;
use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";
/// Maximum number of error body characters surfaced to callers.
const MAX_ERROR_CHARS: usize = 200;

/// Outbound call descriptor.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    /// Set once by the refresh coordinator before the single permitted retry.
    pub retried: bool,
    /// Whether a 401 on this call may trigger refresh or forced logout.
    pub recover_session: bool,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
            retried: false,
            recover_session: true,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attaches a JSON body.
    ///
    /// # Errors
    /// Returns an error if the body cannot be serialized.
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|err| ApiError::Serialization(format!("Failed to encode request: {err}")))?;
        self.body = Some(value);
        Ok(self)
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Opts the call out of session recovery, e.g. for credential checks where a
    /// 401 means "wrong password" rather than "session gone".
    #[must_use]
    pub fn without_session_recovery(mut self) -> Self {
        self.recover_session = false;
        self
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Response as seen by hooks: status plus raw body.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::parse(&self.body)
    }

    /// Decodes a 2xx JSON body; any other status becomes `ApiError::Http`.
    ///
    /// # Errors
    /// Returns an error on non-2xx status or undecodable body.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let response = self.into_success()?;
        serde_json::from_str(&response.body)
            .map_err(|err| ApiError::Parse(format!("Failed to decode response: {err}")))
    }

    /// Checks the status and discards the body.
    ///
    /// # Errors
    /// Returns `ApiError::Http` on non-2xx status.
    pub fn into_success(self) -> Result<Self, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::Http {
                status: self.status,
                message: sanitize_body(&self.body),
            })
        }
    }
}

/// Sends a fully described request. Implementations attach cookies.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;
}

/// Pre-send extension point.
pub trait RequestHook: Send + Sync {
    fn before_send(&self, request: &mut ApiRequest);
}

/// What the post-receive hook wants done with an outcome.
#[derive(Debug)]
pub enum HookOutcome {
    Deliver(Result<ApiResponse, ApiError>),
    Retry,
}

/// Post-receive extension point covering both success and error outcomes.
#[async_trait]
pub trait ResponseHook: Send + Sync {
    async fn after_receive(
        &self,
        request: &mut ApiRequest,
        outcome: Result<ApiResponse, ApiError>,
    ) -> HookOutcome;
}

/// Attaches an `X-Request-Id` when the caller did not provide one. The id
/// survives retries, so a replayed call can be correlated with its first attempt.
#[derive(Debug, Default)]
pub struct RequestIdHook;

impl RequestHook for RequestIdHook {
    fn before_send(&self, request: &mut ApiRequest) {
        if request.header_value(REQUEST_ID_HEADER).is_none() {
            request.set_header(REQUEST_ID_HEADER, ulid::Ulid::new().to_string());
        }
    }
}

/// Transport plus hooks.
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    request_hooks: Vec<Arc<dyn RequestHook>>,
    response_hook: Option<Arc<dyn ResponseHook>>,
}

impl HttpClient {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            request_hooks: Vec::new(),
            response_hook: None,
        }
    }

    #[must_use]
    pub fn with_request_hook(mut self, hook: Arc<dyn RequestHook>) -> Self {
        self.request_hooks.push(hook);
        self
    }

    #[must_use]
    pub fn with_response_hook(mut self, hook: Arc<dyn ResponseHook>) -> Self {
        self.response_hook = Some(hook);
        self
    }

    /// Sends a request through the hooks.
    ///
    /// # Errors
    /// Returns whatever the transport or the post-receive hook delivers.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        loop {
            for hook in &self.request_hooks {
                hook.before_send(&mut request);
            }

            let outcome = self.transport.send(&request).await;

            let Some(hook) = &self.response_hook else {
                return outcome;
            };

            match hook.after_receive(&mut request, outcome).await {
                HookOutcome::Deliver(result) => return result,
                HookOutcome::Retry => {
                    trace!(method = %request.method, path = %request.path, "retrying request");
                }
            }
        }
    }

    /// Fetches JSON with the session cookies.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status, or decode failure.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await?.into_json()
    }

    /// Posts JSON and parses a JSON response.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status, or decode failure.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::post(path).json(body)?)
            .await?
            .into_json()
    }

    /// Replaces a resource and parses the JSON response.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status, or decode failure.
    pub async fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::put(path).json(body)?)
            .await?
            .into_json()
    }

    /// Deletes a resource, ignoring the response body.
    ///
    /// # Errors
    /// Returns an error on transport failure or non-2xx status.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::delete(path)).await?.into_success()?;
        Ok(())
    }

    /// Posts an empty body, ignoring the response body.
    ///
    /// # Errors
    /// Returns an error on transport failure or non-2xx status.
    pub async fn post_empty(&self, path: &str) -> Result<(), ApiError> {
        self.send(ApiRequest::post(path)).await?.into_success()?;
        Ok(())
    }
}

/// Trims and truncates error bodies before they reach callers.
fn sanitize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "Request failed.".to_string()
    } else {
        trimmed.chars().take(MAX_ERROR_CHARS).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockApi;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RetryOnce {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ResponseHook for RetryOnce {
        async fn after_receive(
            &self,
            _request: &mut ApiRequest,
            outcome: Result<ApiResponse, ApiError>,
        ) -> HookOutcome {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                HookOutcome::Retry
            } else {
                HookOutcome::Deliver(outcome)
            }
        }
    }

    #[tokio::test]
    async fn request_id_is_stable_across_retries() {
        let api = Arc::new(MockApi::authenticated());
        let client = HttpClient::new(api.clone())
            .with_request_hook(Arc::new(RequestIdHook))
            .with_response_hook(Arc::new(RetryOnce {
                calls: AtomicUsize::new(0),
            }));

        let response = client.send(ApiRequest::get("/users")).await;
        assert!(response.is_ok());

        let seen = api.request_ids("/users");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], seen[1]);
        assert!(!seen[0].is_empty());
    }

    #[tokio::test]
    async fn without_hooks_outcome_is_returned_as_is() {
        let api = Arc::new(MockApi::authenticated());
        api.respond("/broken", 500, serde_json::json!({"message": "boom"}));
        let client = HttpClient::new(api.clone());

        let response = client.send(ApiRequest::get("/broken")).await;
        let response = response.expect("transport succeeded");
        assert_eq!(response.status, 500);

        let err = client
            .get_json::<Value>("/broken")
            .await
            .expect_err("non-2xx must fail");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn set_header_replaces_case_insensitively() {
        let request = ApiRequest::get("/x")
            .header("x-request-id", "a")
            .header("X-Request-Id", "b");
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header_value("X-REQUEST-ID"), Some("b"));
    }

    #[test]
    fn sanitize_body_trims_and_truncates() {
        assert_eq!(sanitize_body("   "), "Request failed.");
        assert_eq!(sanitize_body("  nope "), "nope");
        let long = "x".repeat(500);
        assert_eq!(sanitize_body(&long).chars().count(), MAX_ERROR_CHARS);
    }

    #[test]
    fn into_json_maps_status() {
        let ok = ApiResponse::new(200, r#"{"a":1}"#);
        let value: Value = ok.into_json().expect("valid json");
        assert_eq!(value["a"], 1);

        let bad = ApiResponse::new(200, "not json");
        assert!(matches!(bad.into_json::<Value>(), Err(ApiError::Parse(_))));

        let denied = ApiResponse::new(403, "forbidden");
        assert!(matches!(
            denied.into_json::<Value>(),
            Err(ApiError::Http { status: 403, .. })
        ));
    }
}
