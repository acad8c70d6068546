//! Error types for the Ampache provider

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use core_sync::{DomainCode, RemoteError};
use thiserror::Error;

/// Ampache error codes carried in `{"error": {"errorCode": ...}}` payloads.
pub mod codes {
    pub const SESSION_EXPIRED: u32 = 4701;
    pub const ACCESS_DENIED: u32 = 4703;
    pub const NOT_FOUND: u32 = 4704;
    pub const DEPRECATED: u32 = 4706;
    pub const BAD_REQUEST: u32 = 4710;
    pub const FAILED_ACCESS_CHECK: u32 = 4742;
}

/// Ampache provider errors
#[derive(Error, Debug)]
pub enum AmpacheError {
    /// The request never got an answer.
    #[error("Transport failure: {0}")]
    Transport(#[from] BridgeError),

    /// Non-2xx HTTP status without an Ampache error payload.
    #[error("HTTP status {status}: {body}")]
    Http { status: u16, body: String },

    /// The server answered with an error payload.
    #[error("Ampache error {code}: {message}")]
    Api { code: u32, message: String },

    /// The payload could not be parsed.
    #[error("Failed to parse Ampache response: {0}")]
    Parse(String),
}

/// Result type for Ampache operations
pub type Result<T> = std::result::Result<T, AmpacheError>;

impl AmpacheError {
    pub fn code(&self) -> Option<u32> {
        match self {
            AmpacheError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == Some(codes::NOT_FOUND)
    }
}

/// Classify an Ampache error code.
pub fn domain_code(code: u32) -> DomainCode {
    match code {
        codes::SESSION_EXPIRED | codes::FAILED_ACCESS_CHECK => DomainCode::SessionExpired,
        codes::ACCESS_DENIED => DomainCode::AccessDenied,
        codes::NOT_FOUND => DomainCode::NotFound,
        codes::DEPRECATED => DomainCode::Unsupported,
        codes::BAD_REQUEST => DomainCode::BadRequest,
        other => DomainCode::Other(other),
    }
}

impl From<AmpacheError> for RemoteError {
    fn from(error: AmpacheError) -> Self {
        match error {
            AmpacheError::Transport(e) if e.is_transport() => RemoteError::Network(e.to_string()),
            AmpacheError::Transport(e) => RemoteError::Network(format!("client failure: {}", e)),
            AmpacheError::Http { status: 429 | 503, body } => {
                RemoteError::domain(DomainCode::RateLimited, body)
            }
            AmpacheError::Http { status, body } if status >= 500 => {
                RemoteError::Network(format!("server status {}: {}", status, body))
            }
            AmpacheError::Http { status, body } => {
                RemoteError::domain(DomainCode::Other(u32::from(status)), body)
            }
            AmpacheError::Api { code, message } => RemoteError::domain(domain_code(code), message),
            AmpacheError::Parse(message) => RemoteError::Malformed(message),
        }
    }
}

impl From<AmpacheError> for AuthError {
    fn from(error: AmpacheError) -> Self {
        match error {
            AmpacheError::Transport(e) => AuthError::Network(e.to_string()),
            AmpacheError::Api { code, message }
                if matches!(code, codes::SESSION_EXPIRED | codes::FAILED_ACCESS_CHECK) =>
            {
                AuthError::InvalidCredentials(message)
            }
            AmpacheError::Api { code, message } => AuthError::Server { code, message },
            AmpacheError::Http { status, body } => AuthError::Server {
                code: u32::from(status),
                message: body,
            },
            AmpacheError::Parse(message) => AuthError::Server { code: 0, message },
        }
    }
}
