//! Published metric names, labels and descriptors
//!
//! Names and label keys are part of the exporter's external contract;
//! dashboards and alerts select on them.

use gcs_exporter_metrics::{MetricDescriptor, MetricKind};

pub const UPDATE_TIME_SECONDS: &str = "gcs_update_time_seconds";
pub const UPDATE_ERRORS_TOTAL: &str = "gcs_update_errors_total";
pub const FILES_TOTAL: &str = "gcs_files_total";
pub const BYTES_TOTAL: &str = "gcs_bytes_total";
pub const FOLDER_FILES_TOTAL: &str = "gcs_folder_files_total";
pub const FOLDER_BYTES_TOTAL: &str = "gcs_folder_bytes_total";
pub const FOLDER_LAST_CREATED_DATE_SECONDS: &str = "gcs_folder_last_created_date_seconds";

pub const LABEL_BUCKET: &str = "bucket";
pub const LABEL_FOLDER: &str = "folder";
pub const LABEL_TYPE: &str = "type";

/// Every family the collector writes
pub const DESCRIPTORS: [MetricDescriptor; 7] = [
    MetricDescriptor {
        name: UPDATE_TIME_SECONDS,
        help: "Most recent time to update metrics",
        kind: MetricKind::Gauge,
        labels: &[LABEL_BUCKET],
    },
    MetricDescriptor {
        name: UPDATE_ERRORS_TOTAL,
        help: "Number of update errors",
        kind: MetricKind::Counter,
        labels: &[LABEL_BUCKET, LABEL_TYPE],
    },
    MetricDescriptor {
        name: FILES_TOTAL,
        help: "GCS file count",
        kind: MetricKind::Gauge,
        labels: &[LABEL_BUCKET],
    },
    MetricDescriptor {
        name: BYTES_TOTAL,
        help: "GCS file bytes total",
        kind: MetricKind::Gauge,
        labels: &[LABEL_BUCKET],
    },
    MetricDescriptor {
        name: FOLDER_FILES_TOTAL,
        help: "GCS file count per folder",
        kind: MetricKind::Gauge,
        labels: &[LABEL_BUCKET, LABEL_FOLDER],
    },
    MetricDescriptor {
        name: FOLDER_BYTES_TOTAL,
        help: "GCS file bytes total per folder",
        kind: MetricKind::Gauge,
        labels: &[LABEL_BUCKET, LABEL_FOLDER],
    },
    MetricDescriptor {
        name: FOLDER_LAST_CREATED_DATE_SECONDS,
        help: "Creation time of the newest file per folder, in unix seconds",
        kind: MetricKind::Gauge,
        labels: &[LABEL_BUCKET, LABEL_FOLDER],
    },
];
