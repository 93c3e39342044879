//! The object listing capability

use async_trait::async_trait;
use futures::stream::BoxStream;
use gcs_exporter_common::{BucketName, ListedObject, ObjectRecord};

use crate::error::StorageError;

/// Lazy, finite, non-restartable sequence of listing entries.
///
/// `None` marks the end of the listing. A backend that yields `Err` is not
/// polled again by the collector.
pub type ObjectStream = BoxStream<'static, Result<ListedObject, StorageError>>;

/// Read-only access to the objects of a bucket
#[async_trait]
pub trait ObjectLister: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Open a listing of every object in `bucket`.
    ///
    /// Pages are fetched as the stream is polled. Dropping the stream
    /// abandons any page request in flight.
    fn list(&self, bucket: &BucketName) -> ObjectStream;

    /// Fetch size and creation time of one object
    async fn head(&self, bucket: &BucketName, object: &str) -> Result<ObjectRecord, StorageError>;
}
