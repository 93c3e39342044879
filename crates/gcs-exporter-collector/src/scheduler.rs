//! Per-bucket collection loops
//!
//! Each configured bucket gets its own task. The first cycle runs
//! immediately; later cycles start one interval after the previous one
//! finished. All loops watch a single [`CancellationToken`] and exit as soon
//! as it fires, abandoning any scan in flight.

use std::sync::Arc;

use gcs_exporter_common::ScrapeTarget;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::collector::BucketCollector;

/// Run cycles for one bucket until `token` is cancelled.
///
/// Returns the number of cycles that ran to completion, failed ones
/// included. Failures never end the loop.
pub async fn run_bucket_loop(
    collector: Arc<BucketCollector>,
    target: ScrapeTarget,
    token: CancellationToken,
) -> u64 {
    let bucket = &target.bucket;
    let mut cycles = 0;

    loop {
        tokio::select! {
            biased;

            () = token.cancelled() => break,

            result = collector.update(bucket) => {
                cycles += 1;
                if let Err(e) = result {
                    warn!(bucket = %bucket, "Cycle failed, retrying in {:?}: {e}", target.interval);
                }
            }
        }

        tokio::select! {
            biased;

            () = token.cancelled() => break,

            () = tokio::time::sleep(target.interval) => {}
        }
    }

    info!(bucket = %bucket, cycles, "Collection loop stopped");
    cycles
}

/// Owns the collection tasks and their shared cancellation token
pub struct Scheduler {
    collector: Arc<BucketCollector>,
    token: CancellationToken,
    tasks: JoinSet<u64>,
}

impl Scheduler {
    pub fn new(collector: Arc<BucketCollector>, token: CancellationToken) -> Self {
        Self {
            collector,
            token,
            tasks: JoinSet::new(),
        }
    }

    /// Start the loop for one bucket
    pub fn spawn(&mut self, target: ScrapeTarget) {
        info!(
            bucket = %target.bucket,
            interval = ?target.interval,
            "Starting collection loop"
        );
        self.tasks.spawn(run_bucket_loop(
            Arc::clone(&self.collector),
            target,
            self.token.clone(),
        ));
    }

    /// Number of loops not yet joined
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Signal every loop to stop
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Wait until every loop has exited.
    ///
    /// Returns the total number of cycles run across all loops.
    pub async fn wait(mut self) -> u64 {
        let mut total = 0;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(cycles) => total += cycles,
                Err(e) => error!("Collection task failed: {e}"),
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use gcs_exporter_common::{BucketName, ObjectRecord};
    use gcs_exporter_metrics::RecordingSink;
    use gcs_exporter_storage::MemoryLister;
    use tokio::time::sleep;

    use crate::aggregator::ScanOptions;
    use crate::names::{FILES_TOTAL, LABEL_BUCKET, LABEL_TYPE, UPDATE_ERRORS_TOTAL};

    fn bucket(name: &str) -> BucketName {
        BucketName::new(name).unwrap()
    }

    fn target(name: &str, secs: u64) -> ScrapeTarget {
        ScrapeTarget {
            bucket: bucket(name),
            interval: Duration::from_secs(secs),
        }
    }

    fn setup() -> (Arc<MemoryLister>, Arc<RecordingSink>, Arc<BucketCollector>) {
        let lister = Arc::new(MemoryLister::new());
        for name in ["bucket-one", "bucket-two"] {
            lister.put_object(
                &bucket(name),
                ObjectRecord::new("logs/a.txt", 10, Utc.timestamp_opt(100, 0).unwrap()),
            );
        }
        let sink = Arc::new(RecordingSink::new());
        let collector = Arc::new(BucketCollector::new(
            lister.clone(),
            sink.clone(),
            ScanOptions::default(),
        ));
        (lister, sink, collector)
    }

    fn listing_errors(sink: &RecordingSink, bucket: &str) -> usize {
        sink.counter_increments(
            UPDATE_ERRORS_TOTAL,
            &[(LABEL_BUCKET, bucket), (LABEL_TYPE, "listing")],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_runs_immediately_then_on_interval() {
        let (lister, sink, collector) = setup();
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_bucket_loop(collector, target("bucket-one", 10), token.clone()));

        sleep(Duration::from_secs(1)).await;
        assert_eq!(lister.list_calls(), 1);
        assert_eq!(
            sink.last_gauge(FILES_TOTAL, &[(LABEL_BUCKET, "bucket-one")]),
            Some(1.0)
        );

        sleep(Duration::from_secs(10)).await;
        assert_eq!(lister.list_calls(), 2);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(lister.list_calls(), 3);

        token.cancel();
        assert_eq!(handle.await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_the_loop() {
        let (lister, sink, collector) = setup();
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_bucket_loop(collector, target("missing-bucket", 10), token.clone()));

        sleep(Duration::from_secs(25)).await;
        assert_eq!(lister.list_calls(), 3);
        assert_eq!(listing_errors(&sink, "missing-bucket"), 3);

        token.cancel();
        assert_eq!(handle.await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_interval_wait() {
        let (lister, _, collector) = setup();
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_bucket_loop(collector, target("bucket-one", 600), token.clone()));

        sleep(Duration::from_secs(5)).await;
        token.cancel();
        assert_eq!(handle.await.unwrap(), 1);

        sleep(Duration::from_secs(1200)).await;
        assert_eq!(lister.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_scan_in_flight() {
        let (lister, sink, collector) = setup();
        lister.stall_listing(&bucket("bucket-one"));
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_bucket_loop(collector, target("bucket-one", 600), token.clone()));

        sleep(Duration::from_secs(5)).await;
        token.cancel();
        assert_eq!(handle.await.unwrap(), 0);
        assert!(sink.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_scan_times_out_and_loop_continues() {
        let (lister, sink, collector) = setup();
        lister.stall_listing(&bucket("bucket-one"));
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_bucket_loop(collector, target("bucket-one", 30), token.clone()));

        // timed out at 60s, next cycle starts at 90s
        sleep(Duration::from_secs(61)).await;
        assert_eq!(listing_errors(&sink, "bucket-one"), 1);
        assert_eq!(lister.list_calls(), 1);

        lister.clear_failures(&bucket("bucket-one"));
        sleep(Duration::from_secs(30)).await;
        assert_eq!(lister.list_calls(), 2);
        assert_eq!(
            sink.last_gauge(FILES_TOTAL, &[(LABEL_BUCKET, "bucket-one")]),
            Some(1.0)
        );

        token.cancel();
        assert_eq!(handle.await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_wait_joins_every_loop() {
        let (lister, _, collector) = setup();
        let mut scheduler = Scheduler::new(collector, CancellationToken::new());
        scheduler.spawn(target("bucket-one", 10));
        scheduler.spawn(target("bucket-two", 20));
        assert_eq!(scheduler.len(), 2);

        sleep(Duration::from_secs(25)).await;
        scheduler.shutdown();
        assert!(scheduler.token().is_cancelled());

        // bucket-one ran at 0, 10, 20; bucket-two at 0, 20
        assert_eq!(scheduler.wait().await, 5);
        assert_eq!(lister.list_calls(), 5);
    }
}
