use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Server unreachable: {0}")]
    Network(String),

    #[error("Server error {code}: {message}")]
    Server { code: u32, message: String },

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Secure storage unavailable: {0}")]
    SecureStorage(String),

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Stored {key} is corrupted: {reason}")]
    Corrupted { key: String, reason: String },

    #[error("Failed to purge cached entities: {0}")]
    CachePurge(String),
}

impl AuthError {
    /// Whether retrying with the same credentials can succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthError::Network(_) | AuthError::Timeout { .. } | AuthError::Server { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
