//! Error types for gcs-exporter
//!
//! Startup and configuration errors. Everything here is fatal: the process
//! reports it and exits before any bucket is scanned.

use crate::types::BucketNameError;
use std::path::PathBuf;
use thiserror::Error;

/// Common result type for gcs-exporter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for gcs-exporter
#[derive(Debug, Error)]
pub enum Error {
    #[error("must provide same number of sources as collection times: {sources} sources, {intervals} times")]
    MismatchedTargets { sources: usize, intervals: usize },

    #[error("no buckets configured: pass --source/--time or add [[bucket]] entries to the config file")]
    NoTargets,

    #[error("invalid bucket source {source_str:?}: {reason}")]
    InvalidSource {
        source_str: String,
        reason: BucketNameError,
    },

    #[error("bucket {0} is configured more than once")]
    DuplicateBucket(String),

    #[error("invalid duration {input:?}: {reason}")]
    InvalidDuration { input: String, reason: String },

    #[error("invalid listen address {addr:?}: {reason}")]
    InvalidListenAddress { addr: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid duration error
    pub fn invalid_duration(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error came from the target list rather than a single value
    #[must_use]
    pub const fn is_target_list_error(&self) -> bool {
        matches!(
            self,
            Self::MismatchedTargets { .. } | Self::NoTargets | Self::DuplicateBucket(_)
        )
    }
}
