//! HTTP transport for OpenAI-compatible chat-completions endpoints
//!
//! Posts the payload as JSON with `Authorization: Bearer <key>` and a
//! per-request timeout. Connection faults, timeouts and unreadable bodies
//! become `Unknown` failures; non-success statuses are classified by
//! `classify_status`. No retries happen here.

use std::time::Duration;

use common::ApiKey;
use tracing::{debug, warn};

use crate::{Result, SendFuture, Transport, TransportError, TransportFailure};

/// JSON-over-HTTP transport bound to one endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for `api_url` (must be http or https).
    pub fn new(client: reqwest::Client, api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let api_url = api_url.into();
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(TransportError::Config(format!(
                "api_url must start with http:// or https://, got: {api_url}"
            )));
        }
        if timeout.is_zero() {
            return Err(TransportError::Config(
                "timeout must be greater than 0".into(),
            ));
        }
        Ok(Self {
            client,
            api_url,
            timeout,
        })
    }

    /// Build with a fresh `reqwest::Client`.
    pub fn with_default_client(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Self::new(client, api_url, timeout)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn post(
        &self,
        payload: &serde_json::Value,
        key: &ApiKey,
    ) -> std::result::Result<serde_json::Value, TransportFailure> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(key.expose())
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection"
                } else {
                    "request"
                };
                warn!(key = %key.name(), reason, error = %e, "provider request failed before a response");
                TransportFailure::unknown(format!("{reason} error: {e}"))
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            warn!(key = %key.name(), status, error = %e, "failed to read provider response body");
            TransportFailure::new(
                crate::FailureKind::Unknown,
                Some(status),
                format!("body read error: {e}"),
            )
        })?;

        if let Some(failure) = TransportFailure::from_response(status, &body) {
            debug!(key = %key.name(), status, kind = failure.kind.label(), "provider returned failure");
            return Err(failure);
        }

        serde_json::from_str(&body).map_err(|e| {
            warn!(key = %key.name(), status, error = %e, "provider returned unparseable JSON");
            TransportFailure::new(
                crate::FailureKind::Unknown,
                Some(status),
                format!("invalid JSON response: {e}"),
            )
        })
    }
}

impl Transport for HttpTransport {
    fn id(&self) -> &str {
        "http"
    }

    fn send<'a>(&'a self, payload: &'a serde_json::Value, key: &'a ApiKey) -> SendFuture<'a> {
        Box::pin(self.post(payload, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FailureKind;

    #[test]
    fn rejects_url_without_scheme() {
        let err = HttpTransport::with_default_client("openrouter.ai/api", Duration::from_secs(5))
            .err()
            .unwrap();
        assert!(err.to_string().contains("api_url must start with http"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let result = HttpTransport::with_default_client("https://example.com", Duration::ZERO);
        assert!(result.is_err());
    }

    #[test]
    fn keeps_api_url() {
        let t = HttpTransport::with_default_client(
            "https://openrouter.ai/api/v1/chat/completions",
            Duration::from_secs(60),
        )
        .unwrap();
        assert_eq!(t.api_url(), "https://openrouter.ai/api/v1/chat/completions");
        assert_eq!(t.id(), "http");
    }

    /// Start an upstream that answers every request with `status` and `body`.
    async fn start_upstream(status: u16, body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let status = axum::http::StatusCode::from_u16(status).unwrap();
        tokio::spawn(async move {
            let app = axum::Router::new().fallback(move || async move { (status, body) });
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1/chat/completions")
    }

    /// Start an upstream that echoes the Authorization header and request body.
    async fn start_echo_upstream() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = axum::Router::new().fallback(
                |headers: axum::http::HeaderMap, axum::Json(body): axum::Json<serde_json::Value>| async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    axum::Json(serde_json::json!({"authorization": auth, "received": body}))
                },
            );
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1/chat/completions")
    }

    async fn send_to(url: String) -> std::result::Result<serde_json::Value, TransportFailure> {
        let t = HttpTransport::with_default_client(url, Duration::from_secs(5)).unwrap();
        let key = ApiKey::numbered(["sk-upstream"]).remove(0);
        let payload = serde_json::json!({"model": "m", "messages": []});
        t.send(&payload, &key).await
    }

    #[tokio::test]
    async fn success_returns_parsed_body_and_sends_bearer_key() {
        let response = send_to(start_echo_upstream().await).await.unwrap();
        assert_eq!(response["authorization"], "Bearer sk-upstream");
        assert_eq!(response["received"]["model"], "m");
    }

    #[tokio::test]
    async fn success_with_invalid_json_is_unknown_with_status() {
        let failure = send_to(start_upstream(200, "<html>not json</html>").await)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unknown);
        assert_eq!(failure.status, Some(200));
        assert_eq!(failure.status_code(), crate::NO_STATUS);
        assert!(failure.message.contains("invalid JSON response"));
    }

    #[tokio::test]
    async fn too_many_requests_is_rate_limited() {
        let failure = send_to(start_upstream(429, "slow down").await)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert_eq!(failure.status_code(), 429);
    }

    #[tokio::test]
    async fn rate_limit_body_on_other_status_is_rate_limited() {
        let body = r#"{"error":{"message":"Rate limit exceeded: free-models-per-min"}}"#;
        let failure = send_to(start_upstream(400, body).await).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert_eq!(failure.status, Some(400));
        assert_eq!(failure.status_code(), 429);
    }

    #[tokio::test]
    async fn server_error_keeps_observed_status() {
        let failure = send_to(start_upstream(503, "upstream unavailable").await)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::ServerError);
        assert_eq!(failure.status, Some(503));
        assert_eq!(failure.status_code(), 503);
        assert!(failure.message.contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn client_error_is_classified() {
        let failure = send_to(start_upstream(401, "invalid api key").await)
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::ClientError);
        assert_eq!(failure.status_code(), 401);
    }

    #[tokio::test]
    async fn connection_refused_is_unknown_failure() {
        // Port 9 (discard) on loopback is closed in test environments.
        let t = HttpTransport::with_default_client("http://127.0.0.1:9/v1", Duration::from_secs(2))
            .unwrap();
        let key = ApiKey::numbered(["sk-test"]).remove(0);
        let payload = serde_json::json!({"model": "m", "messages": []});

        let failure = t.send(&payload, &key).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Unknown);
        assert_eq!(failure.status, None);
        assert!(!failure.message.contains("sk-test"));
    }
}
