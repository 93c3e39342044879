//! Per-bucket aggregates
//!
//! A [`BucketSnapshot`] is built from one listing pass and never merged with
//! an earlier one. Folder statistics only reflect objects seen in that pass.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use gcs_exporter_common::ObjectRecord;

/// Folder key of objects at the top level of a bucket
pub const ROOT_FOLDER: &str = ".";

/// Directory component of an object name.
///
/// `a/b/c.txt` maps to `a/b`, `c.txt` to `.`, and `/c.txt` to `/`. Folder
/// placeholder objects (`a/b/`) map to their own path without the slash.
pub fn folder_key(name: &str) -> &str {
    match name.rfind('/') {
        None => ROOT_FOLDER,
        Some(0) => "/",
        Some(i) => &name[..i],
    }
}

/// Aggregates for one folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderStats {
    pub files: u64,
    pub bytes: u64,
    /// Newest creation time among the folder's objects
    pub last_created: DateTime<Utc>,
}

impl FolderStats {
    fn first(record: &ObjectRecord) -> Self {
        Self {
            files: 1,
            bytes: record.size,
            last_created: record.created,
        }
    }

    fn add(&mut self, record: &ObjectRecord) {
        self.files += 1;
        self.bytes += record.size;
        self.last_created = self.last_created.max(record.created);
    }
}

/// Result of one full listing pass over a bucket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub total_files: u64,
    pub total_bytes: u64,
    pub folders: HashMap<String, FolderStats>,
}

impl BucketSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a set of records into a snapshot
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ObjectRecord>) -> Self {
        let mut snapshot = Self::new();
        for record in records {
            snapshot.add(record);
        }
        snapshot
    }

    /// Count one object
    pub fn add(&mut self, record: &ObjectRecord) {
        self.total_files += 1;
        self.total_bytes += record.size;

        let key = folder_key(&record.name);
        match self.folders.get_mut(key) {
            Some(stats) => stats.add(record),
            None => {
                self.folders.insert(key.to_string(), FolderStats::first(record));
            }
        }
    }

    /// Statistics for one folder
    pub fn folder(&self, key: &str) -> Option<&FolderStats> {
        self.folders.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.total_files == 0
    }

    /// Check that the bucket totals equal the sums over folders
    pub fn is_consistent(&self) -> bool {
        let files: u64 = self.folders.values().map(|f| f.files).sum();
        let bytes: u64 = self.folders.values().map(|f| f.bytes).sum();
        files == self.total_files && bytes == self.total_bytes
    }
}
