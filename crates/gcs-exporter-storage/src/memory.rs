//! In-memory object listing backend
//!
//! Buckets live in a map and list in lexicographic name order, the way GCS
//! returns them. Failures can be injected per bucket to exercise the
//! collector's error paths.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::{stream, StreamExt};
use gcs_exporter_common::{BucketName, ListedObject, ObjectRecord};
use parking_lot::RwLock;

use crate::error::StorageError;
use crate::lister::{ObjectLister, ObjectStream};

#[derive(Debug, Clone)]
struct MemoryBucket {
    objects: BTreeMap<String, ObjectRecord>,
    /// Listing fails when it reaches this entry index
    fail_listing_at: Option<usize>,
    /// Metadata fetches for these names fail
    fail_metadata: HashSet<String>,
    /// Whether listing entries carry size and creation time
    inline_metadata: bool,
    /// Listing never yields an entry
    stalled: bool,
}

impl Default for MemoryBucket {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
            fail_listing_at: None,
            fail_metadata: HashSet::new(),
            inline_metadata: true,
            stalled: false,
        }
    }
}

/// In-memory lister
#[derive(Debug, Default)]
pub struct MemoryLister {
    buckets: RwLock<HashMap<BucketName, MemoryBucket>>,
    list_calls: AtomicUsize,
    head_calls: AtomicUsize,
}

impl MemoryLister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty bucket. Listing an unknown bucket fails.
    pub fn create_bucket(&self, bucket: &BucketName) {
        self.buckets.write().entry(bucket.clone()).or_default();
    }

    /// Insert or replace an object
    pub fn put_object(&self, bucket: &BucketName, record: ObjectRecord) {
        self.buckets
            .write()
            .entry(bucket.clone())
            .or_default()
            .objects
            .insert(record.name.clone(), record);
    }

    /// Insert several objects
    pub fn put_objects(&self, bucket: &BucketName, records: impl IntoIterator<Item = ObjectRecord>) {
        let mut buckets = self.buckets.write();
        let entry = buckets.entry(bucket.clone()).or_default();
        for record in records {
            entry.objects.insert(record.name.clone(), record);
        }
    }

    /// Remove an object, returning whether it existed
    pub fn delete_object(&self, bucket: &BucketName, name: &str) -> bool {
        self.buckets
            .write()
            .get_mut(bucket)
            .is_some_and(|b| b.objects.remove(name).is_some())
    }

    /// Make the listing fail when it reaches entry `index` (0-based)
    pub fn fail_listing_at(&self, bucket: &BucketName, index: usize) {
        self.with_bucket(bucket, |b| b.fail_listing_at = Some(index));
    }

    /// Make metadata fetches for `name` fail
    pub fn fail_metadata_for(&self, bucket: &BucketName, name: &str) {
        self.with_bucket(bucket, |b| {
            b.fail_metadata.insert(name.to_string());
        });
    }

    /// Choose whether listing entries carry size and creation time
    pub fn set_inline_metadata(&self, bucket: &BucketName, inline: bool) {
        self.with_bucket(bucket, |b| b.inline_metadata = inline);
    }

    /// Make the listing hang without yielding
    pub fn stall_listing(&self, bucket: &BucketName) {
        self.with_bucket(bucket, |b| b.stalled = true);
    }

    /// Remove every injected failure from a bucket
    pub fn clear_failures(&self, bucket: &BucketName) {
        self.with_bucket(bucket, |b| {
            b.fail_listing_at = None;
            b.fail_metadata.clear();
            b.stalled = false;
        });
    }

    /// Number of listings opened so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    /// Number of metadata fetches so far
    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::Relaxed)
    }

    fn with_bucket(&self, bucket: &BucketName, f: impl FnOnce(&mut MemoryBucket)) {
        f(self.buckets.write().entry(bucket.clone()).or_default());
    }
}

#[async_trait]
impl ObjectLister for MemoryLister {
    fn name(&self) -> &str {
        "memory"
    }

    fn list(&self, bucket: &BucketName) -> ObjectStream {
        self.list_calls.fetch_add(1, Ordering::Relaxed);

        let buckets = self.buckets.read();
        let Some(state) = buckets.get(bucket) else {
            let err = StorageError::listing(bucket.as_str(), "storage: bucket doesn't exist");
            return stream::once(async move { Err(err) }).boxed();
        };
        if state.stalled {
            return stream::pending().boxed();
        }

        let mut entries: Vec<Result<ListedObject, StorageError>> = Vec::with_capacity(state.objects.len());
        for (index, record) in state.objects.values().enumerate() {
            if state.fail_listing_at == Some(index) {
                entries.push(Err(StorageError::listing(
                    bucket.as_str(),
                    format!("injected failure at entry {index}"),
                )));
                break;
            }
            if state.inline_metadata {
                entries.push(Ok(ListedObject::from(record.clone())));
            } else {
                entries.push(Ok(ListedObject::name_only(record.name.clone())));
            }
        }
        stream::iter(entries).boxed()
    }

    async fn head(&self, bucket: &BucketName, object: &str) -> Result<ObjectRecord, StorageError> {
        self.head_calls.fetch_add(1, Ordering::Relaxed);

        let buckets = self.buckets.read();
        let state = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::metadata(bucket.as_str(), object, "storage: bucket doesn't exist"))?;
        if state.fail_metadata.contains(object) {
            return Err(StorageError::metadata(bucket.as_str(), object, "injected failure"));
        }
        state
            .objects
            .get(object)
            .cloned()
            .ok_or_else(|| StorageError::metadata(bucket.as_str(), object, "storage: object doesn't exist"))
    }
}
