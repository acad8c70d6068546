//! Ampache JSON API transport
//!
//! Every call is a GET against `{server}/server/json.server.php` with the
//! action and its parameters in the query string. Error payloads are
//! detected before the body is decoded into the expected type.

use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::dto::ErrorEnvelope;
use crate::error::{AmpacheError, Result};

/// JSON endpoint path below the server URL.
const JSON_ENDPOINT: &str = "server/json.server.php";

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin typed wrapper over an [`HttpClient`].
pub struct AmpacheClient {
    http_client: Arc<dyn HttpClient>,
    timeout: Duration,
    read_retry: RetryPolicy,
    user_agent: Option<String>,
}

impl AmpacheClient {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            http_client,
            timeout: DEFAULT_TIMEOUT,
            read_retry: RetryPolicy::default(),
            user_agent: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retry policy for read-only actions. Mutations are never retried.
    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Full endpoint URL for `server_url`.
    pub fn endpoint(server_url: &str) -> String {
        format!("{}/{}", server_url.trim_end_matches('/'), JSON_ENDPOINT)
    }

    /// Run a read-only action and decode the raw JSON answer.
    pub async fn read(
        &self,
        server_url: &str,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<Value> {
        self.call(server_url, action, params, true).await
    }

    /// Run a state-changing action and decode the raw JSON answer.
    pub async fn write(
        &self,
        server_url: &str,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<Value> {
        self.call(server_url, action, params, false).await
    }

    /// Run a read-only action and decode the answer into `T`.
    pub async fn read_as<T: DeserializeOwned>(
        &self,
        server_url: &str,
        action: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let value = self.read(server_url, action, params).await?;
        decode(action, value)
    }

    #[instrument(skip(self, params), fields(action = %action))]
    async fn call(
        &self,
        server_url: &str,
        action: &str,
        params: &[(&str, String)],
        idempotent: bool,
    ) -> Result<Value> {
        let mut request = HttpRequest::get(Self::endpoint(server_url))
            .header("Accept", "application/json")
            .timeout(self.timeout)
            .query("action", action);
        if let Some(user_agent) = &self.user_agent {
            request = request.header("User-Agent", user_agent.clone());
        }
        for (key, value) in params {
            request = request.query(*key, value.clone());
        }

        let response = if idempotent {
            self.http_client
                .execute_with_retry(request, self.read_retry.clone())
                .await?
        } else {
            self.http_client.execute(request).await?
        };

        let value: Option<Value> = serde_json::from_slice(&response.body).ok();

        // Ampache reports most failures with a 200 and an error payload, but
        // proxies and some versions use a non-2xx status with the same body.
        if let Some(error) = value.as_ref().and_then(error_payload) {
            warn!(code = error.0, message = %error.1, "Ampache returned an error payload");
            return Err(AmpacheError::Api {
                code: error.0,
                message: error.1,
            });
        }

        if !response.is_success() {
            warn!(status = response.status, "Ampache request failed");
            return Err(AmpacheError::Http {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        let value = value.ok_or_else(|| {
            AmpacheError::Parse(format!("{} answered with a non-JSON body", action))
        })?;
        debug!(status = response.status, "Ampache request succeeded");
        Ok(value)
    }
}

/// Decode a JSON answer into `T`.
pub fn decode<T: DeserializeOwned>(action: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| AmpacheError::Parse(format!("unexpected {} payload: {}", action, e)))
}

fn error_payload(value: &Value) -> Option<(u32, String)> {
    value.get("error")?;
    let envelope: ErrorEnvelope = serde_json::from_value(value.clone()).ok()?;
    Some((envelope.error.error_code, envelope.error.error_message))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use bridge_traits::error::BridgeError;

    #[test]
    fn test_endpoint_joins_paths() {
        assert_eq!(
            AmpacheClient::endpoint("https://music.example.com/"),
            "https://music.example.com/server/json.server.php"
        );
    }

    #[tokio::test]
    async fn test_read_sends_action_and_params() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .times(1)
            .returning(|request, _| {
                assert_eq!(request.query_value("action"), Some("albums"));
                assert_eq!(request.query_value("offset"), Some("20"));
                assert_eq!(request.query_value("auth"), Some("token-1"));
                json_response(r#"{"album": []}"#)
            });

        let client = AmpacheClient::new(Arc::new(http));
        let value = client
            .read(
                "https://music.example.com",
                "albums",
                &[("auth", "token-1".to_string()), ("offset", "20".to_string())],
            )
            .await
            .unwrap();
        assert!(value.get("album").is_some());
    }

    #[tokio::test]
    async fn test_writes_are_not_retried() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().times(0);
        http.expect_execute()
            .times(1)
            .returning(|_| json_response(r#"{"success": "flag set"}"#));

        let client = AmpacheClient::new(Arc::new(http));
        client
            .write("https://music.example.com", "flag", &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_payload_becomes_api_error() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().returning(|_, _| {
            json_response(r#"{"error": {"errorCode": "4704", "errorMessage": "Not Found"}}"#)
        });

        let client = AmpacheClient::new(Arc::new(http));
        let error = client
            .read("https://music.example.com", "album", &[])
            .await
            .unwrap_err();
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn test_error_payload_wins_over_status() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().returning(|_, _| {
            status_response(
                400,
                r#"{"error": {"errorCode": 4710, "errorMessage": "Bad Request"}}"#,
            )
        });

        let client = AmpacheClient::new(Arc::new(http));
        let error = client
            .read("https://music.example.com", "songs", &[])
            .await
            .unwrap_err();
        assert_eq!(error.code(), Some(4710));
    }

    #[tokio::test]
    async fn test_non_json_status_is_http_error() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .returning(|_, _| status_response(503, "Service Unavailable"));

        let client = AmpacheClient::new(Arc::new(http));
        let error = client
            .read("https://music.example.com", "songs", &[])
            .await
            .unwrap_err();
        assert!(matches!(error, AmpacheError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_transport_failure_is_propagated() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .returning(|_, _| Err(BridgeError::Connection("refused".to_string())));

        let client = AmpacheClient::new(Arc::new(http));
        let error = client
            .read("https://music.example.com", "songs", &[])
            .await
            .unwrap_err();
        assert!(matches!(error, AmpacheError::Transport(_)));
    }
}
