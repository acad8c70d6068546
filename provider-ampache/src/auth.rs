//! Ampache handshake, ping and goodbye

use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Duration, Utc};
use core_auth::{AuthChallenge, AuthError, Authenticator, Session};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::client::{decode, AmpacheClient};
use crate::dto::{HandshakeResponse, PingResponse};
use crate::error::codes;

/// Default API version announced during the handshake.
pub const API_VERSION: &str = "6.6.1";

/// [`Authenticator`] for Ampache servers.
pub struct AmpacheAuthenticator {
    client: Arc<AmpacheClient>,
    clock: Arc<dyn Clock>,
    api_version: String,
    /// Assumed when the server does not report an expiry.
    fallback_lifetime: Duration,
}

impl AmpacheAuthenticator {
    pub fn new(client: Arc<AmpacheClient>) -> Self {
        Self {
            client,
            clock: Arc::new(SystemClock),
            api_version: API_VERSION.to_string(),
            fallback_lifetime: Duration::hours(1),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_fallback_lifetime(mut self, lifetime: Duration) -> Self {
        self.fallback_lifetime = lifetime;
        self
    }

    fn session_from(&self, response: HandshakeResponse) -> core_auth::Result<Session> {
        if response.auth.is_empty() {
            return Err(AuthError::Server {
                code: 0,
                message: "handshake answered without a session token".to_string(),
            });
        }

        let issued_at = self.clock.now();
        let expires_at = response
            .session_expire
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|expiry| expiry.with_timezone(&Utc));

        Ok(match expires_at {
            Some(expires_at) => Session::new(response.auth, issued_at, expires_at),
            None => {
                warn!(
                    lifetime_secs = self.fallback_lifetime.num_seconds(),
                    "Handshake did not report a usable expiry"
                );
                Session::with_lifetime(response.auth, issued_at, self.fallback_lifetime)
            }
        })
    }
}

#[async_trait]
impl Authenticator for AmpacheAuthenticator {
    #[instrument(skip(self, challenge), fields(user = ?challenge.username()))]
    async fn handshake(
        &self,
        server_url: &str,
        challenge: &AuthChallenge,
    ) -> core_auth::Result<Session> {
        let mut params = vec![("version", self.api_version.clone())];
        match challenge {
            AuthChallenge::ApiToken { token } => params.push(("auth", token.clone())),
            AuthChallenge::Password {
                username,
                timestamp,
                passphrase,
            } => {
                params.push(("auth", passphrase.clone()));
                params.push(("timestamp", timestamp.to_string()));
                params.push(("user", username.clone()));
            }
        }

        let response: HandshakeResponse = self
            .client
            .read_as(server_url, "handshake", &params)
            .await?;
        if let Some(api) = &response.api {
            info!(api = %api, "Handshake accepted");
        }
        self.session_from(response)
    }

    #[instrument(skip(self, session))]
    async fn ping(&self, server_url: &str, session: &Session) -> core_auth::Result<bool> {
        let params = [("auth", session.token().to_string())];
        match self.client.read(server_url, "ping", &params).await {
            Ok(value) => {
                let response: PingResponse = decode("ping", value)?;
                Ok(response.session_expire.is_some())
            }
            Err(e) if e.code() == Some(codes::SESSION_EXPIRED) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, session))]
    async fn goodbye(&self, server_url: &str, session: &Session) -> core_auth::Result<()> {
        let params = [("auth", session.token().to_string())];
        match self.client.write(server_url, "goodbye", &params).await {
            Ok(_) => Ok(()),
            // Already gone.
            Err(e) if e.code() == Some(codes::SESSION_EXPIRED) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::time::FixedClock;
    use core_auth::Credentials;

    const NOW: i64 = 1_700_000_000;

    fn authenticator(http: MockHttpClient) -> AmpacheAuthenticator {
        AmpacheAuthenticator::new(Arc::new(AmpacheClient::new(Arc::new(http))))
            .with_clock(Arc::new(FixedClock::at_timestamp(NOW)))
    }

    #[tokio::test]
    async fn test_password_handshake_sends_salted_passphrase() {
        let credentials = Credentials::with_password("https://music.example.com", "ann", "hunter2");
        let challenge = credentials.challenge(NOW);
        let expected = match &challenge {
            AuthChallenge::Password { passphrase, .. } => passphrase.clone(),
            AuthChallenge::ApiToken { .. } => unreachable!(),
        };

        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .times(1)
            .returning(move |request, _| {
                assert_eq!(request.query_value("action"), Some("handshake"));
                assert_eq!(request.query_value("version"), Some(API_VERSION));
                assert_eq!(request.query_value("user"), Some("ann"));
                assert_eq!(request.query_value("timestamp"), Some("1700000000"));
                assert_eq!(request.query_value("auth"), Some(expected.as_str()));
                json_response(
                    r#"{"auth": "token-abc", "api": "6.6.1", "session_expire": "2023-11-14T23:13:20+00:00"}"#,
                )
            });

        let session = authenticator(http)
            .handshake("https://music.example.com", &challenge)
            .await
            .unwrap();
        assert_eq!(session.token(), "token-abc");
        assert_eq!(session.issued_at().timestamp(), NOW);
        assert_eq!(session.expires_at().timestamp(), NOW + 3600);
    }

    #[tokio::test]
    async fn test_api_key_handshake_sends_key() {
        let challenge = AuthChallenge::ApiToken {
            token: "key-123".to_string(),
        };

        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().returning(|request, _| {
            assert_eq!(request.query_value("auth"), Some("key-123"));
            assert_eq!(request.query_value("user"), None);
            json_response(r#"{"auth": "token-abc"}"#)
        });

        let session = authenticator(http)
            .with_fallback_lifetime(Duration::minutes(10))
            .handshake("https://music.example.com", &challenge)
            .await
            .unwrap();
        assert_eq!(session.expires_at().timestamp(), NOW + 600);
    }

    #[tokio::test]
    async fn test_rejected_handshake_is_invalid_credentials() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().returning(|_, _| {
            json_response(r#"{"error": {"errorCode": "4701", "errorMessage": "Received Invalid Handshake"}}"#)
        });

        let error = authenticator(http)
            .handshake(
                "https://music.example.com",
                &AuthChallenge::ApiToken {
                    token: "wrong".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(error, AuthError::InvalidCredentials(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .returning(|_, _| Err(BridgeError::Connection("refused".to_string())));

        let error = authenticator(http)
            .handshake(
                "https://music.example.com",
                &AuthChallenge::ApiToken {
                    token: "key".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(error, AuthError::Network(_)));
        assert!(error.is_recoverable());
    }

    #[tokio::test]
    async fn test_ping_reports_session_liveness() {
        let session = Session::with_lifetime("token-1", Utc::now(), Duration::hours(1));

        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().times(1).returning(|_, _| {
            json_response(r#"{"session_expire": "2030-01-01T00:00:00+00:00", "version": "6.6.1"}"#)
        });
        assert!(authenticator(http)
            .ping("https://music.example.com", &session)
            .await
            .unwrap());

        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().times(1).returning(|_, _| {
            json_response(r#"{"error": {"errorCode": "4701", "errorMessage": "Session Expired"}}"#)
        });
        assert!(!authenticator(http)
            .ping("https://music.example.com", &session)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_goodbye_tolerates_expired_session() {
        let session = Session::with_lifetime("token-1", Utc::now(), Duration::hours(1));

        let mut http = MockHttpClient::new();
        http.expect_execute().times(1).returning(|request| {
            assert_eq!(request.query_value("action"), Some("goodbye"));
            json_response(r#"{"error": {"errorCode": "4701", "errorMessage": "Session Expired"}}"#)
        });

        authenticator(http)
            .goodbye("https://music.example.com", &session)
            .await
            .unwrap();
    }
}
