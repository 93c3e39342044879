//! Core type definitions for gcs-exporter
//!
//! This module defines the bucket identifier and the object records the
//! storage backends hand to the collector.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// URI scheme accepted in front of a bucket name on the command line
pub const GCS_SCHEME: &str = "gs://";

/// Name of a Google Cloud Storage bucket
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(try_from = "String", into = "String")]
pub struct BucketName(String);

impl BucketName {
    /// Create a new bucket name (validates GCS naming rules)
    pub fn new(name: impl Into<String>) -> Result<Self, BucketNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Parse a bucket source: either `gs://<bucket>` or a bare bucket name.
    ///
    /// A trailing `/` after the bucket is tolerated; any object path after
    /// the bucket is rejected since scans always cover the whole bucket.
    pub fn from_source(source: &str) -> Result<Self, BucketNameError> {
        let trimmed = source.trim();
        let name = trimmed.strip_prefix(GCS_SCHEME).unwrap_or(trimmed);
        let name = name.strip_suffix('/').unwrap_or(name);
        if name.contains('/') {
            return Err(BucketNameError::HasObjectPath);
        }
        Self::new(name)
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the bucket name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate bucket name according to GCS rules
    fn validate(name: &str) -> Result<(), BucketNameError> {
        if name.len() < 3 {
            return Err(BucketNameError::TooShort);
        }
        // Dotted names may be up to 222 characters, 63 per component
        if name.contains('.') {
            if name.len() > 222 || name.split('.').any(|c| c.len() > 63) {
                return Err(BucketNameError::TooLong);
            }
        } else if name.len() > 63 {
            return Err(BucketNameError::TooLong);
        }

        let bytes = name.as_bytes();
        let first = bytes[0];
        if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
            return Err(BucketNameError::InvalidStartChar);
        }
        let last = bytes[bytes.len() - 1];
        if !last.is_ascii_lowercase() && !last.is_ascii_digit() {
            return Err(BucketNameError::InvalidEndChar);
        }

        for c in name.chars() {
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && !matches!(c, '-' | '_' | '.') {
                return Err(BucketNameError::InvalidChar(c));
            }
        }

        if name.starts_with("goog") || name.contains("google") {
            return Err(BucketNameError::ReservedName);
        }

        if name.parse::<std::net::Ipv4Addr>().is_ok() {
            return Err(BucketNameError::LooksLikeIpAddress);
        }

        Ok(())
    }
}

impl fmt::Debug for BucketName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BucketName({:?})", self.0)
    }
}

impl FromStr for BucketName {
    type Err = BucketNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_source(s)
    }
}

impl TryFrom<String> for BucketName {
    type Error = BucketNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_source(&value)
    }
}

impl From<BucketName> for String {
    fn from(value: BucketName) -> Self {
        value.0
    }
}

impl AsRef<str> for BucketName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors that can occur when creating a bucket name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BucketNameError {
    #[error("bucket name must be at least 3 characters")]
    TooShort,
    #[error("bucket name is too long")]
    TooLong,
    #[error("bucket name must start with a lowercase letter or number")]
    InvalidStartChar,
    #[error("bucket name must end with a lowercase letter or number")]
    InvalidEndChar,
    #[error("bucket name contains invalid character: {0}")]
    InvalidChar(char),
    #[error("bucket name cannot start with \"goog\" or contain \"google\"")]
    ReservedName,
    #[error("bucket name cannot be formatted as an IP address")]
    LooksLikeIpAddress,
    #[error("bucket source must name a whole bucket, not an object path")]
    HasObjectPath,
}

/// Fully resolved metadata for one stored object.
///
/// Produced by a storage backend; read-only to the collector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRecord {
    /// Hierarchical object name (`a/b/c.txt`)
    pub name: String,
    /// Object size in bytes
    pub size: u64,
    /// Creation timestamp
    pub created: DateTime<Utc>,
}

impl ObjectRecord {
    pub fn new(name: impl Into<String>, size: u64, created: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            size,
            created,
        }
    }
}

/// One entry of a bucket listing.
///
/// Backends whose listing API already returns size and creation time fill
/// both fields; others leave them empty and the collector falls back to a
/// metadata fetch for the entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListedObject {
    pub name: String,
    pub size: Option<u64>,
    pub created: Option<DateTime<Utc>>,
}

impl ListedObject {
    /// A listing entry that carries no inline metadata
    pub fn name_only(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            created: None,
        }
    }

    /// The complete record, if the listing supplied all metadata inline
    #[must_use]
    pub fn inline_record(&self) -> Option<ObjectRecord> {
        match (self.size, self.created) {
            (Some(size), Some(created)) => Some(ObjectRecord::new(self.name.clone(), size, created)),
            _ => None,
        }
    }
}

impl From<ObjectRecord> for ListedObject {
    fn from(record: ObjectRecord) -> Self {
        Self {
            name: record.name,
            size: Some(record.size),
            created: Some(record.created),
        }
    }
}
