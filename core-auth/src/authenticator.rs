//! Handshake seam implemented by remote provider crates.

use crate::error::Result;
use crate::types::{AuthChallenge, Session};
use async_trait::async_trait;

/// Obtains sessions from a catalog server.
///
/// Implementations map an explicit rejection of the challenge to
/// [`AuthError::InvalidCredentials`](crate::AuthError::InvalidCredentials),
/// transport failures to [`AuthError::Network`](crate::AuthError::Network)
/// and any other error payload to [`AuthError::Server`](crate::AuthError::Server).
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Exchange a challenge for a new session.
    async fn handshake(&self, server_url: &str, challenge: &AuthChallenge) -> Result<Session>;

    /// Check whether `session` is still accepted by the server.
    async fn ping(&self, _server_url: &str, session: &Session) -> Result<bool> {
        Ok(!session.token().is_empty())
    }

    /// Tell the server the session is no longer needed.
    async fn goodbye(&self, _server_url: &str, _session: &Session) -> Result<()> {
        Ok(())
    }
}
