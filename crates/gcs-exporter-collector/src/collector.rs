//! One update cycle for a bucket: scan, then publish

use std::sync::Arc;
use std::time::Duration;

use gcs_exporter_common::BucketName;
use gcs_exporter_metrics::MetricsSink;
use gcs_exporter_storage::ObjectLister;
use tokio::time::Instant;
use tracing::{error, info};

use crate::aggregator::{Aggregator, ScanOptions};
use crate::error::ScanError;
use crate::publisher::Publisher;

/// Outcome of a successful cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub total_files: u64,
    pub total_bytes: u64,
    pub folders: usize,
    pub elapsed: Duration,
}

/// Scans a bucket and publishes the result
pub struct BucketCollector {
    aggregator: Aggregator,
    publisher: Publisher,
}

impl BucketCollector {
    pub fn new(lister: Arc<dyn ObjectLister>, sink: Arc<dyn MetricsSink>, options: ScanOptions) -> Self {
        Self {
            aggregator: Aggregator::new(lister, Arc::clone(&sink), options),
            publisher: Publisher::new(sink),
        }
    }

    pub const fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Run one cycle.
    ///
    /// A failed scan publishes nothing: gauges keep the values of the last
    /// successful cycle and only the error counter moves.
    pub async fn update(&self, bucket: &BucketName) -> Result<CycleReport, ScanError> {
        let start = Instant::now();
        info!(bucket = %bucket, "Starting to walk bucket");

        let snapshot = match self.aggregator.scan(bucket).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(bucket = %bucket, kind = %e.kind(), "Update failed: {e}");
                return Err(e);
            }
        };

        self.publisher.publish(bucket, &snapshot);
        let elapsed = start.elapsed();
        self.publisher.record_duration(bucket, elapsed);

        info!(
            bucket = %bucket,
            files = snapshot.total_files,
            bytes = snapshot.total_bytes,
            folders = snapshot.folders.len(),
            "Total time to update: {elapsed:?}"
        );

        Ok(CycleReport {
            total_files: snapshot.total_files,
            total_bytes: snapshot.total_bytes,
            folders: snapshot.folders.len(),
            elapsed,
        })
    }
}
