//! gcs-exporter Storage - object listing backends
//!
//! The collector only sees the [`ObjectLister`] capability: a lazy,
//! paginated listing of a bucket plus a per-object metadata fetch.
//!
//! Backends:
//! - [`GcsLister`]: Google Cloud Storage through its JSON API
//! - [`MemoryLister`]: in-memory buckets with failure injection

pub mod auth;
pub mod error;
pub mod gcs;
pub mod lister;
pub mod memory;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{Credentials, TokenSource};
pub use error::{AuthError, StorageError};
pub use gcs::{GcsLister, GcsOptions};
pub use lister::{ObjectLister, ObjectStream};
pub use memory::MemoryLister;
