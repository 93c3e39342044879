//! gcs-exporter
//!
//! Periodically lists Google Cloud Storage buckets and serves file counts,
//! byte totals and per-folder recency as Prometheus metrics.

pub mod cli;
pub mod logging;
pub mod server;

pub use cli::{Args, Settings};
