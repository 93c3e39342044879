//! Scan errors

use std::fmt;
use std::time::Duration;

use gcs_exporter_storage::StorageError;
use thiserror::Error;

/// Sub-operation of a scan that failed.
///
/// The label value is the `type` label of `gcs_update_errors_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Opening or paging through the bucket listing
    Listing,
    /// Fetching one object's size and creation time
    MetadataFetch,
}

impl FailureKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::MetadataFetch => "metadata-fetch",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scan aborted before covering the whole bucket
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan of bucket {bucket} aborted: {source}")]
    Listing {
        bucket: String,
        #[source]
        source: StorageError,
    },

    #[error("scan of bucket {bucket} aborted at object {object:?}: {source}")]
    MetadataFetch {
        bucket: String,
        object: String,
        #[source]
        source: StorageError,
    },

    #[error("scan of bucket {bucket} exceeded {timeout:?} during {stage}{}", object_suffix(.object))]
    Timeout {
        bucket: String,
        stage: FailureKind,
        object: Option<String>,
        timeout: Duration,
    },
}

fn object_suffix(object: &Option<String>) -> String {
    object
        .as_ref()
        .map(|o| format!(" of object {o:?}"))
        .unwrap_or_default()
}

impl ScanError {
    /// Which sub-operation failed
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Listing { .. } => FailureKind::Listing,
            Self::MetadataFetch { .. } => FailureKind::MetadataFetch,
            Self::Timeout { stage, .. } => *stage,
        }
    }

    /// Bucket the scan was for
    #[must_use]
    pub fn bucket(&self) -> &str {
        match self {
            Self::Listing { bucket, .. }
            | Self::MetadataFetch { bucket, .. }
            | Self::Timeout { bucket, .. } => bucket,
        }
    }

    /// Object the scan stopped at, when the failure was object-specific
    #[must_use]
    pub fn object(&self) -> Option<&str> {
        match self {
            Self::MetadataFetch { object, .. } => Some(object),
            Self::Timeout { object, .. } => object.as_deref(),
            Self::Listing { .. } => None,
        }
    }

    /// Check if the scan ran out of time rather than hitting a backend error
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_labels() {
        assert_eq!(FailureKind::Listing.as_str(), "listing");
        assert_eq!(FailureKind::MetadataFetch.to_string(), "metadata-fetch");
    }

    #[test]
    fn test_scan_error_accessors() {
        let err = ScanError::MetadataFetch {
            bucket: "archive".into(),
            object: "a/x.txt".into(),
            source: StorageError::metadata("archive", "a/x.txt", "not found"),
        };
        assert_eq!(err.kind(), FailureKind::MetadataFetch);
        assert_eq!(err.bucket(), "archive");
        assert_eq!(err.object(), Some("a/x.txt"));
        assert!(err.to_string().contains("a/x.txt"));

        let err = ScanError::Timeout {
            bucket: "archive".into(),
            stage: FailureKind::Listing,
            object: None,
            timeout: Duration::from_secs(60),
        };
        assert_eq!(err.kind(), FailureKind::Listing);
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "scan of bucket archive exceeded 60s during listing");
    }
}
