//! gcs-exporter Collector
//!
//! Turns bucket listings into published metrics:
//! - **Aggregator**: one full listing pass folded into a [`BucketSnapshot`]
//! - **Publisher**: writes a snapshot to the metrics sink as gauges
//! - **BucketCollector**: scan plus publish, one update cycle
//! - **Scheduler**: one independent loop per bucket, sharing a single
//!   cancellation token

pub mod aggregator;
pub mod collector;
pub mod error;
pub mod names;
pub mod publisher;
pub mod scheduler;
pub mod snapshot;

pub use aggregator::{Aggregator, ScanOptions};
pub use collector::{BucketCollector, CycleReport};
pub use error::{FailureKind, ScanError};
pub use publisher::Publisher;
pub use scheduler::{run_bucket_loop, Scheduler};
pub use snapshot::{folder_key, BucketSnapshot, FolderStats};
