//! Error taxonomy of the library service.

use super::blob_store::BlobError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Unauthenticated(String),
    /// Index store failure, wrapped with the operation it interrupted.
    #[error("index store: {context}: {source}")]
    Index {
        context: String,
        #[source]
        source: sqlx::Error,
    },
    /// Blob store failure other than a missing key.
    #[error("blob store: {context}: {source}")]
    Blob {
        context: String,
        #[source]
        source: BlobError,
    },
}

pub type LibraryResult<T> = Result<T, LibraryError>;

impl LibraryError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// True for index and blob store failures.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Index { .. } | Self::Blob { .. })
    }
}

/// `map_err` adapter attaching context to an index store error.
pub fn index_err(context: impl Into<String>) -> impl FnOnce(sqlx::Error) -> LibraryError {
    let context = context.into();
    move |source| LibraryError::Index { context, source }
}

/// `map_err` adapter for blob store errors.
///
/// A rejected key is the caller's fault and maps to an invalid argument; a
/// missing key maps to not-found. Everything else is a store failure.
pub fn blob_err(context: impl Into<String>) -> impl FnOnce(BlobError) -> LibraryError {
    let context = context.into();
    move |source| match source {
        BlobError::InvalidKey(key) => LibraryError::InvalidArgument(format!("invalid key: {}", key)),
        BlobError::NotFound(key) => LibraryError::NotFound(format!("{}: {} not found", context, key)),
        source => LibraryError::Blob { context, source },
    }
}
