//! Snapshot publishing
//!
//! Every value is written with `set_gauge`, so publishing the same snapshot
//! twice leaves the same state behind. Folders missing from a later snapshot
//! keep their last published values.

use std::sync::Arc;
use std::time::Duration;

use gcs_exporter_common::BucketName;
use gcs_exporter_metrics::MetricsSink;

use crate::names::{
    BYTES_TOTAL, FILES_TOTAL, FOLDER_BYTES_TOTAL, FOLDER_FILES_TOTAL, FOLDER_LAST_CREATED_DATE_SECONDS,
    LABEL_BUCKET, LABEL_FOLDER, UPDATE_TIME_SECONDS,
};
use crate::snapshot::BucketSnapshot;

/// Writes bucket snapshots to a metrics sink
pub struct Publisher {
    sink: Arc<dyn MetricsSink>,
}

impl Publisher {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }

    /// Overwrite the bucket totals and every folder series in `snapshot`
    #[allow(clippy::cast_precision_loss)]
    pub fn publish(&self, bucket: &BucketName, snapshot: &BucketSnapshot) {
        let bucket_labels = [(LABEL_BUCKET, bucket.as_str())];
        self.sink
            .set_gauge(FILES_TOTAL, &bucket_labels, snapshot.total_files as f64);
        self.sink
            .set_gauge(BYTES_TOTAL, &bucket_labels, snapshot.total_bytes as f64);

        for (folder, stats) in &snapshot.folders {
            let labels = [(LABEL_BUCKET, bucket.as_str()), (LABEL_FOLDER, folder.as_str())];
            self.sink
                .set_gauge(FOLDER_FILES_TOTAL, &labels, stats.files as f64);
            self.sink
                .set_gauge(FOLDER_BYTES_TOTAL, &labels, stats.bytes as f64);
            self.sink.set_gauge(
                FOLDER_LAST_CREATED_DATE_SECONDS,
                &labels,
                stats.last_created.timestamp() as f64,
            );
        }
    }

    /// Record how long the last scan-plus-publish cycle took
    pub fn record_duration(&self, bucket: &BucketName, elapsed: Duration) {
        self.sink.set_gauge(
            UPDATE_TIME_SECONDS,
            &[(LABEL_BUCKET, bucket.as_str())],
            elapsed.as_secs_f64(),
        );
    }
}
