use crate::remote::{DomainCode, RemoteError};
use core_auth::AuthError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({code}): {message}")]
    Domain { code: DomainCode, message: String },

    #[error("Malformed payload: {0}")]
    Merge(String),

    #[error("Cache error: {0}")]
    Cache(LibraryError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Mutation rejected: {0}")]
    Rejected(String),

    #[error("Offline mode is enabled")]
    Offline,

    #[error("Operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether retrying later may succeed without user action.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Offline => true,
            SyncError::Domain { code, .. } => code.is_transient(),
            SyncError::Auth(e) => e.is_recoverable(),
            _ => false,
        }
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(
            self,
            SyncError::Domain {
                code: DomainCode::SessionExpired,
                ..
            }
        )
    }
}

impl From<LibraryError> for SyncError {
    fn from(err: LibraryError) -> Self {
        match err {
            LibraryError::InvalidEntity { field, message } => {
                SyncError::Merge(format!("{}: {}", field, message))
            }
            LibraryError::Payload(e) => SyncError::Merge(e.to_string()),
            other => SyncError::Cache(other),
        }
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Network(message) => SyncError::Network(message),
            RemoteError::Domain { code, message } => SyncError::Domain { code, message },
            RemoteError::Malformed(message) => SyncError::Merge(message),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_entities_map_to_merge_errors() {
        let err: SyncError = LibraryError::InvalidEntity {
            field: "album.name".to_string(),
            message: "cannot be empty".to_string(),
        }
        .into();
        assert!(matches!(err, SyncError::Merge(ref m) if m.contains("album.name")));
    }

    #[test]
    fn test_recoverability() {
        assert!(SyncError::Network("reset".to_string()).is_recoverable());
        assert!(SyncError::Domain {
            code: DomainCode::RateLimited,
            message: "slow down".to_string()
        }
        .is_recoverable());
        assert!(!SyncError::Merge("missing id".to_string()).is_recoverable());
        assert!(
            !SyncError::Auth(AuthError::InvalidCredentials("bad".to_string())).is_recoverable()
        );

        let expired: SyncError = RemoteError::Domain {
            code: DomainCode::SessionExpired,
            message: "expired".to_string(),
        }
        .into();
        assert!(expired.is_session_expired());
    }
}
