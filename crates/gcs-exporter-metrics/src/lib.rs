//! gcs-exporter Metrics
//!
//! This crate provides:
//! - **MetricsSink**: the write-only interface collectors publish through
//! - **MetricsRegistry**: a label-scoped gauge/counter store safe for
//!   concurrent writers
//! - **PrometheusExporter**: renders a registry in Prometheus text format
//! - **RecordingSink**: a fake sink that records every call, for tests

pub mod exporter;
pub mod registry;
pub mod sink;

pub use exporter::{PrometheusExporter, CONTENT_TYPE};
pub use registry::{MetricDescriptor, MetricKind, MetricsRegistry};
pub use sink::{MetricsSink, RecordingSink, SinkCall};
