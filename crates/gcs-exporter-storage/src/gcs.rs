//! Google Cloud Storage backend
//!
//! Talks to the GCS JSON API directly. Object names are passed through
//! byte for byte: GCS allows `//`, `.` segments, leading and trailing `/`,
//! and all of them must reach the folder aggregation unchanged.
//!
//! The listing asks for `name`, `size` and `timeCreated` only, so inline
//! scans never issue per-object requests. Credentials are resolved once in
//! [`GcsLister::connect`] so a bad key file fails at startup.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use gcs_exporter_common::{BucketName, ListedObject, ObjectRecord};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::auth::{Credentials, TokenSource};
use crate::error::StorageError;
use crate::lister::{ObjectLister, ObjectStream};

/// Public GCS endpoint
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
/// Endpoint override honoured by the Google client libraries
pub const EMULATOR_HOST_ENV: &str = "STORAGE_EMULATOR_HOST";

const LIST_FIELDS: &str = "items(name,size,timeCreated),nextPageToken";
const OBJECT_FIELDS: &str = "name,size,timeCreated";
const MAX_RESULTS: &str = "1000";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options applied to every bucket
#[derive(Debug, Clone, Default)]
pub struct GcsOptions {
    /// Service account or authorized user key file. When unset, credentials
    /// come from the environment (`GOOGLE_APPLICATION_CREDENTIALS`, metadata
    /// server).
    pub credentials: Option<String>,
    /// API endpoint, e.g. an emulator. Requests are anonymous when this is
    /// set and no credentials file is named.
    pub endpoint: Option<String>,
}

/// One object resource, restricted to the requested fields
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    /// uint64 encoded as a JSON string
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    time_created: Option<String>,
}

impl ObjectResource {
    fn size(&self) -> Option<u64> {
        self.size.as_deref()?.parse().ok()
    }

    fn created(&self) -> Option<DateTime<Utc>> {
        let raw = self.time_created.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Entries with unreadable fields are left for a metadata fetch
    fn into_listed(self, bucket: &BucketName) -> ListedObject {
        let size = self.size();
        let created = self.created();
        if size.is_none() || created.is_none() {
            warn!(
                bucket = %bucket,
                object = %self.name,
                size = ?self.size,
                time_created = ?self.time_created,
                "Listing entry without usable size or creation time"
            );
        }
        ListedObject {
            name: self.name,
            size,
            created,
        }
    }

    fn into_record(self, bucket: &BucketName) -> Result<ObjectRecord, StorageError> {
        match (self.size(), self.created()) {
            (Some(size), Some(created)) => Ok(ObjectRecord::new(self.name, size, created)),
            _ => Err(StorageError::metadata(
                bucket.as_str(),
                &self.name,
                "object metadata lacks a valid size or timeCreated",
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectsPage {
    #[serde(default)]
    items: Vec<ObjectResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

struct GcsClient {
    http: reqwest::Client,
    endpoint: String,
    tokens: TokenSource,
}

impl GcsClient {
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        not_found: &str,
    ) -> Result<T, String> {
        let mut request = self.http.get(url).query(query);
        if let Some(token) = self.tokens.bearer().await.map_err(|e| e.to_string())? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(not_found.to_string());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("GCS returned status {status}: {body}"));
        }
        response.json().await.map_err(|e| e.to_string())
    }

    async fn list_page(
        &self,
        bucket: &BucketName,
        page_token: Option<&str>,
    ) -> Result<ObjectsPage, StorageError> {
        let url = format!("{}/storage/v1/b/{}/o", self.endpoint, bucket);
        let mut query = vec![("fields", LIST_FIELDS), ("maxResults", MAX_RESULTS)];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        let page: ObjectsPage = self
            .get_json(&url, &query, "storage: bucket doesn't exist")
            .await
            .map_err(|e| StorageError::listing(bucket.as_str(), e))?;
        debug!(bucket = %bucket, objects = page.items.len(), "Fetched listing page");
        Ok(page)
    }

    async fn object(&self, bucket: &BucketName, object: &str) -> Result<ObjectRecord, StorageError> {
        let url = format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            bucket,
            urlencoding::encode(object)
        );
        let resource: ObjectResource = self
            .get_json(&url, &[("fields", OBJECT_FIELDS)], "storage: object doesn't exist")
            .await
            .map_err(|e| StorageError::metadata(bucket.as_str(), object, e))?;
        resource.into_record(bucket)
    }
}

/// Google Cloud Storage lister
pub struct GcsLister {
    buckets: HashSet<BucketName>,
    client: Arc<GcsClient>,
}

impl std::fmt::Debug for GcsLister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsLister")
            .field("buckets", &self.buckets)
            .finish_non_exhaustive()
    }
}

impl GcsLister {
    /// Resolve credentials and build the HTTP client shared by all buckets.
    /// Nothing is sent to GCS until the first scan.
    pub fn connect(buckets: &[BucketName], options: &GcsOptions) -> Result<Self, StorageError> {
        let client_error = |message: String| StorageError::Client {
            bucket: buckets
                .iter()
                .map(BucketName::as_str)
                .collect::<Vec<_>>()
                .join(","),
            message,
        };

        let endpoint = options
            .endpoint
            .clone()
            .or_else(|| std::env::var(EMULATOR_HOST_ENV).ok().filter(|v| !v.is_empty()));
        let credentials = match (&options.credentials, &endpoint) {
            (Some(path), _) => Credentials::from_file(Path::new(path)),
            (None, Some(_)) => Ok(Credentials::Anonymous),
            (None, None) => Credentials::from_env(),
        }
        .map_err(|e| client_error(e.to_string()))?;
        let endpoint = endpoint.map_or_else(
            || DEFAULT_ENDPOINT.to_string(),
            |e| normalize_endpoint(&e),
        );

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| client_error(e.to_string()))?;

        info!(
            buckets = buckets.len(),
            endpoint = %endpoint,
            credentials = credentials.kind(),
            "GCS client ready"
        );
        Ok(Self {
            buckets: buckets.iter().cloned().collect(),
            client: Arc::new(GcsClient {
                tokens: TokenSource::new(credentials, http.clone()),
                http,
                endpoint,
            }),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.client.endpoint
    }
}

/// Emulator hosts are often given without a scheme
fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

enum PageCursor {
    First,
    Next(String),
    Done,
}

async fn next_page(
    client: Arc<GcsClient>,
    bucket: BucketName,
    cursor: PageCursor,
) -> Result<Option<(Vec<ListedObject>, PageCursor)>, StorageError> {
    let page_token = match cursor {
        PageCursor::First => None,
        PageCursor::Next(token) => Some(token),
        PageCursor::Done => return Ok(None),
    };
    let page = client.list_page(&bucket, page_token.as_deref()).await?;
    let entries = page
        .items
        .into_iter()
        .map(|item| item.into_listed(&bucket))
        .collect();
    let cursor = page.next_page_token.map_or(PageCursor::Done, PageCursor::Next);
    Ok(Some((entries, cursor)))
}

#[async_trait]
impl ObjectLister for GcsLister {
    fn name(&self) -> &str {
        "gcs"
    }

    fn list(&self, bucket: &BucketName) -> ObjectStream {
        if !self.buckets.contains(bucket) {
            let err = StorageError::listing(bucket.as_str(), "no client configured for bucket");
            return stream::once(async move { Err(err) }).boxed();
        }

        let client = Arc::clone(&self.client);
        let bucket = bucket.clone();
        stream::try_unfold(PageCursor::First, move |cursor| {
            next_page(Arc::clone(&client), bucket.clone(), cursor)
        })
        .map_ok(|entries| stream::iter(entries.into_iter().map(Ok::<_, StorageError>)))
        .try_flatten()
        .boxed()
    }

    async fn head(&self, bucket: &BucketName, object: &str) -> Result<ObjectRecord, StorageError> {
        if !self.buckets.contains(bucket) {
            return Err(StorageError::metadata(
                bucket.as_str(),
                object,
                "no client configured for bucket",
            ));
        }
        self.client.object(bucket, object).await
    }
}
