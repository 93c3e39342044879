//! gcs-exporter Common - Shared types and configuration
//!
//! This crate provides the bucket and object types, the error definitions,
//! and the configuration model used across all gcs-exporter components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, ListingStrategy, LogFormat, ScrapeTarget};
pub use error::{Error, Result};
pub use types::*;
