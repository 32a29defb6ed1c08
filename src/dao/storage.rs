use std::error::Error;
use thiserror::Error;

/// Result alias for live store and group directory operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by persistence collaborators regardless of the backing database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not be reached or rejected the operation.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Operation that failed.
        message: String,
        /// Backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The addressed record does not exist (or belongs to another room).
    #[error("{entity} `{id}` not found")]
    NotFound {
        /// Kind of record, e.g. `audience question`.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a not-found error for the given entity kind.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StorageError::NotFound {
            entity,
            id: id.into(),
        }
    }
}
