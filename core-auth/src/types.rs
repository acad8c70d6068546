use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Lowercase hex SHA-256 digest of `input`.
///
/// ```
/// use core_auth::sha256_hex;
///
/// assert_eq!(
///     sha256_hex("abc"),
///     "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
/// );
/// ```
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// An authenticated, time-bounded credential for network calls.
///
/// A session is valid iff `now < expires_at`. The token is embedded in media
/// URLs returned by the server, so it is never logged; the `Debug`
/// implementation redacts it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    token: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl Session {
    pub fn new(
        token: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token: token.into(),
            issued_at,
            expires_at,
            refresh_token: None,
        }
    }

    /// Session issued at `issued_at` that lives for `lifetime`.
    pub fn with_lifetime(
        token: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self::new(token, issued_at, issued_at + lifetime)
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Stable, non-reversible identifier of the token.
    pub fn fingerprint(&self) -> String {
        sha256_hex(&self.token)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Stored login material. Only the SHA-256 of the password is kept.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub server_url: String,
    pub username: String,
    pub password_hash: String,
    /// Long-lived API key; preferred over the password when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

impl Credentials {
    /// Credentials for username/password login.
    pub fn with_password(
        server_url: impl Into<String>,
        username: impl Into<String>,
        password: &str,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            username: username.into(),
            password_hash: sha256_hex(password),
            api_token: None,
        }
    }

    /// Credentials for API key login.
    pub fn with_api_token(
        server_url: impl Into<String>,
        username: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            username: username.into(),
            password_hash: String::new(),
            api_token: Some(api_token.into()),
        }
    }

    /// Build the handshake challenge for the given client timestamp.
    pub fn challenge(&self, timestamp: i64) -> AuthChallenge {
        match &self.api_token {
            Some(token) if !token.is_empty() => AuthChallenge::ApiToken {
                token: token.clone(),
            },
            _ => AuthChallenge::Password {
                username: self.username.clone(),
                timestamp,
                passphrase: passphrase(timestamp, &self.password_hash),
            },
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field("password_hash", &"[REDACTED]")
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Time-salted password proof: `sha256_hex(timestamp + password_hash)`.
pub fn passphrase(timestamp: i64, password_hash: &str) -> String {
    sha256_hex(&format!("{}{}", timestamp, password_hash))
}

/// What the client presents to the server during a handshake.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthChallenge {
    ApiToken {
        token: String,
    },
    Password {
        username: String,
        timestamp: i64,
        passphrase: String,
    },
}

impl AuthChallenge {
    pub fn username(&self) -> Option<&str> {
        match self {
            AuthChallenge::ApiToken { .. } => None,
            AuthChallenge::Password { username, .. } => Some(username),
        }
    }
}

impl fmt::Debug for AuthChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthChallenge::ApiToken { .. } => f
                .debug_struct("ApiToken")
                .field("token", &"[REDACTED]")
                .finish(),
            AuthChallenge::Password {
                username,
                timestamp,
                ..
            } => f
                .debug_struct("Password")
                .field("username", username)
                .field("timestamp", timestamp)
                .field("passphrase", &"[REDACTED]")
                .finish(),
        }
    }
}
