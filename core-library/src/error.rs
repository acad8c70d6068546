use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An entity failed validation before it reached the cache.
    #[error("Invalid entity: {field} - {message}")]
    InvalidEntity { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    /// A stored payload could not be encoded or decoded.
    #[error("Cached payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LibraryError>;
