//! Storage backend errors

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by an [`ObjectLister`](crate::ObjectLister)
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// Fetching a page of the bucket listing failed
    #[error("Bucket({bucket:?}).Objects: {message}")]
    Listing { bucket: String, message: String },

    /// Fetching one object's metadata failed
    #[error("Object({object:?}).Attrs in bucket {bucket}: {message}")]
    Metadata {
        bucket: String,
        object: String,
        message: String,
    },

    /// The backend could not build a client for the bucket
    #[error("failed to create storage client for bucket {bucket}: {message}")]
    Client { bucket: String, message: String },
}

impl StorageError {
    /// Create a listing error
    pub fn listing(bucket: impl Into<String>, message: impl ToString) -> Self {
        Self::Listing {
            bucket: bucket.into(),
            message: message.to_string(),
        }
    }

    /// Create a metadata-fetch error
    pub fn metadata(
        bucket: impl Into<String>,
        object: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        Self::Metadata {
            bucket: bucket.into(),
            object: object.into(),
            message: message.to_string(),
        }
    }

    /// Check if the error came from the listing itself
    #[must_use]
    pub const fn is_listing(&self) -> bool {
        matches!(self, Self::Listing { .. })
    }

    /// Check if the error came from a per-object metadata fetch
    #[must_use]
    pub const fn is_metadata(&self) -> bool {
        matches!(self, Self::Metadata { .. })
    }

    /// Object name involved, for metadata errors
    #[must_use]
    pub fn object(&self) -> Option<&str> {
        match self {
            Self::Metadata { object, .. } => Some(object),
            _ => None,
        }
    }
}

/// Errors obtaining an OAuth access token for the storage API
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to read credentials file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid credentials file {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    #[error("token request failed: {0}")]
    Token(String),
}

impl AuthError {
    pub fn invalid(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Invalid {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
