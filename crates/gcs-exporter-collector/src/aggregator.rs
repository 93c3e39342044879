//! One listing pass over a bucket
//!
//! The aggregator opens a listing, resolves each entry to an
//! [`ObjectRecord`] and folds it into a [`BucketSnapshot`]. Any error aborts
//! the pass; nothing partial is returned. Every await is bounded by the scan
//! deadline.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use gcs_exporter_common::config::DEFAULT_SCAN_TIMEOUT;
use gcs_exporter_common::{BucketName, ListingStrategy, ObjectRecord};
use gcs_exporter_metrics::MetricsSink;
use gcs_exporter_storage::ObjectLister;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::error::{FailureKind, ScanError};
use crate::names::{LABEL_BUCKET, LABEL_TYPE, UPDATE_ERRORS_TOTAL};
use crate::snapshot::BucketSnapshot;

/// Scan behaviour shared by every bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Wall-clock budget for one full pass
    pub timeout: Duration,
    /// How size and creation time are obtained
    pub strategy: ListingStrategy,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SCAN_TIMEOUT,
            strategy: ListingStrategy::Inline,
        }
    }
}

/// Lists buckets and folds them into snapshots
pub struct Aggregator {
    lister: Arc<dyn ObjectLister>,
    sink: Arc<dyn MetricsSink>,
    options: ScanOptions,
}

impl Aggregator {
    pub fn new(lister: Arc<dyn ObjectLister>, sink: Arc<dyn MetricsSink>, options: ScanOptions) -> Self {
        Self {
            lister,
            sink,
            options,
        }
    }

    pub const fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Run one full pass over `bucket`.
    ///
    /// On failure `gcs_update_errors_total{bucket, type}` is incremented once
    /// before the error is returned.
    pub async fn scan(&self, bucket: &BucketName) -> Result<BucketSnapshot, ScanError> {
        let result = self.fold(bucket).await;
        if let Err(e) = &result {
            self.sink.increment_counter(
                UPDATE_ERRORS_TOTAL,
                &[(LABEL_BUCKET, bucket.as_str()), (LABEL_TYPE, e.kind().as_str())],
            );
        }
        result
    }

    async fn fold(&self, bucket: &BucketName) -> Result<BucketSnapshot, ScanError> {
        let deadline = Instant::now() + self.options.timeout;
        let mut listing = self.lister.list(bucket);
        let mut snapshot = BucketSnapshot::new();

        loop {
            let entry = match timeout_at(deadline, listing.next()).await {
                Err(_) => return Err(self.timed_out(bucket, FailureKind::Listing, None)),
                Ok(None) => break,
                Ok(Some(Err(source))) => {
                    return Err(ScanError::Listing {
                        bucket: bucket.to_string(),
                        source,
                    });
                }
                Ok(Some(Ok(entry))) => entry,
            };

            let inline = match self.options.strategy {
                ListingStrategy::Inline => entry.inline_record(),
                ListingStrategy::PerObject => None,
            };
            let record = match inline {
                Some(record) => record,
                None => self.fetch_metadata(bucket, &entry.name, deadline).await?,
            };
            snapshot.add(&record);
        }

        debug!(
            bucket = %bucket,
            files = snapshot.total_files,
            folders = snapshot.folders.len(),
            "Listing complete"
        );
        Ok(snapshot)
    }

    async fn fetch_metadata(
        &self,
        bucket: &BucketName,
        object: &str,
        deadline: Instant,
    ) -> Result<ObjectRecord, ScanError> {
        match timeout_at(deadline, self.lister.head(bucket, object)).await {
            Ok(Ok(record)) => Ok(record),
            Ok(Err(source)) => Err(ScanError::MetadataFetch {
                bucket: bucket.to_string(),
                object: object.to_string(),
                source,
            }),
            Err(_) => Err(self.timed_out(bucket, FailureKind::MetadataFetch, Some(object))),
        }
    }

    fn timed_out(&self, bucket: &BucketName, stage: FailureKind, object: Option<&str>) -> ScanError {
        ScanError::Timeout {
            bucket: bucket.to_string(),
            stage,
            object: object.map(str::to_string),
            timeout: self.options.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use gcs_exporter_metrics::RecordingSink;
    use gcs_exporter_storage::MemoryLister;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn record(name: &str, size: u64, created: i64) -> ObjectRecord {
        ObjectRecord::new(name, size, at(created))
    }

    fn bucket() -> BucketName {
        BucketName::new("archive-bucket").unwrap()
    }

    fn sample_lister() -> Arc<MemoryLister> {
        let lister = Arc::new(MemoryLister::new());
        lister.put_objects(
            &bucket(),
            [
                record("a/x.txt", 10, 100),
                record("a/y.txt", 20, 200),
                record("b/z.txt", 5, 50),
            ],
        );
        lister
    }

    fn aggregator(
        lister: &Arc<MemoryLister>,
        sink: &Arc<RecordingSink>,
        strategy: ListingStrategy,
    ) -> Aggregator {
        Aggregator::new(
            lister.clone(),
            sink.clone(),
            ScanOptions {
                timeout: Duration::from_secs(60),
                strategy,
            },
        )
    }

    fn error_count(sink: &RecordingSink, kind: &str) -> usize {
        sink.counter_increments(
            UPDATE_ERRORS_TOTAL,
            &[(LABEL_BUCKET, "archive-bucket"), (LABEL_TYPE, kind)],
        )
    }

    #[tokio::test]
    async fn test_scan_folds_inline_listing() {
        let lister = sample_lister();
        let sink = Arc::new(RecordingSink::new());
        let aggregator = aggregator(&lister, &sink, ListingStrategy::Inline);

        let snapshot = aggregator.scan(&bucket()).await.unwrap();
        assert_eq!(snapshot.total_files, 3);
        assert_eq!(snapshot.total_bytes, 35);
        let a = snapshot.folder("a").unwrap();
        assert_eq!((a.files, a.bytes, a.last_created), (2, 30, at(200)));
        let b = snapshot.folder("b").unwrap();
        assert_eq!((b.files, b.bytes, b.last_created), (1, 5, at(50)));

        assert_eq!(lister.head_calls(), 0);
        // the aggregator itself only ever touches the error counter
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scan_empty_bucket() {
        let lister = Arc::new(MemoryLister::new());
        lister.create_bucket(&bucket());
        let sink = Arc::new(RecordingSink::new());

        let snapshot = aggregator(&lister, &sink, ListingStrategy::Inline)
            .scan(&bucket())
            .await
            .unwrap();
        assert_eq!(snapshot, BucketSnapshot::new());
    }

    #[tokio::test]
    async fn test_per_object_strategy_fetches_every_object() {
        let lister = sample_lister();
        let sink = Arc::new(RecordingSink::new());

        let snapshot = aggregator(&lister, &sink, ListingStrategy::PerObject)
            .scan(&bucket())
            .await
            .unwrap();
        assert_eq!(snapshot.total_bytes, 35);
        assert_eq!(lister.head_calls(), 3);
    }

    #[tokio::test]
    async fn test_inline_strategy_falls_back_without_inline_metadata() {
        let lister = sample_lister();
        lister.set_inline_metadata(&bucket(), false);
        let sink = Arc::new(RecordingSink::new());

        let snapshot = aggregator(&lister, &sink, ListingStrategy::Inline)
            .scan(&bucket())
            .await
            .unwrap();
        assert_eq!(snapshot.total_files, 3);
        assert_eq!(snapshot.folder("a").unwrap().last_created, at(200));
        assert_eq!(lister.head_calls(), 3);
    }

    #[tokio::test]
    async fn test_listing_failure_mid_scan() {
        let lister = sample_lister();
        lister.fail_listing_at(&bucket(), 2);
        let sink = Arc::new(RecordingSink::new());

        let err = aggregator(&lister, &sink, ListingStrategy::Inline)
            .scan(&bucket())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Listing);
        assert_eq!(err.bucket(), "archive-bucket");
        assert_eq!(error_count(&sink, "listing"), 1);
        assert_eq!(error_count(&sink, "metadata-fetch"), 0);
        assert_eq!(sink.gauge_set_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_bucket_is_a_listing_failure() {
        let lister = Arc::new(MemoryLister::new());
        let sink = Arc::new(RecordingSink::new());

        let err = aggregator(&lister, &sink, ListingStrategy::Inline)
            .scan(&bucket())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bucket doesn't exist"));
        assert_eq!(error_count(&sink, "listing"), 1);
    }

    #[tokio::test]
    async fn test_metadata_failure_names_the_object() {
        let lister = sample_lister();
        lister.fail_metadata_for(&bucket(), "a/y.txt");
        let sink = Arc::new(RecordingSink::new());

        let err = aggregator(&lister, &sink, ListingStrategy::PerObject)
            .scan(&bucket())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::MetadataFetch);
        assert_eq!(err.object(), Some("a/y.txt"));
        assert_eq!(error_count(&sink, "metadata-fetch"), 1);
        assert_eq!(error_count(&sink, "listing"), 0);
        // aborted at the second object, the third is never fetched
        assert_eq!(lister.head_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_listing_times_out() {
        let lister = sample_lister();
        lister.stall_listing(&bucket());
        let sink = Arc::new(RecordingSink::new());
        let aggregator = aggregator(&lister, &sink, ListingStrategy::Inline);

        let start = Instant::now();
        let err = aggregator.scan(&bucket()).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.kind(), FailureKind::Listing);
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert_eq!(error_count(&sink, "listing"), 1);
    }

    #[tokio::test]
    async fn test_each_failed_scan_counts_once() {
        let lister = sample_lister();
        lister.fail_listing_at(&bucket(), 0);
        let sink = Arc::new(RecordingSink::new());
        let aggregator = aggregator(&lister, &sink, ListingStrategy::Inline);

        for _ in 0..3 {
            assert!(aggregator.scan(&bucket()).await.is_err());
        }
        assert_eq!(error_count(&sink, "listing"), 3);

        lister.clear_failures(&bucket());
        assert!(aggregator.scan(&bucket()).await.is_ok());
        assert_eq!(error_count(&sink, "listing"), 3);
    }
}
