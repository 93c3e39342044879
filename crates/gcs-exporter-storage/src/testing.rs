//! In-process stand-in for the GCS JSON API and OAuth token endpoint

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Objects returned per listing page
pub(crate) const PAGE_SIZE: usize = 2;

#[derive(Default)]
pub(crate) struct MockState {
    buckets: Mutex<HashMap<String, Vec<Value>>>,
    token_lifetime: u64,
    pub fail_listing: AtomicBool,
    pub token_requests: AtomicUsize,
    pub list_requests: AtomicUsize,
    pub last_grant_type: Mutex<Option<String>>,
    pub authorization: Mutex<Vec<Option<String>>>,
}

pub(crate) struct MockGcs {
    pub base_url: String,
    pub state: Arc<MockState>,
}

impl MockGcs {
    pub async fn start(token_lifetime: u64) -> Self {
        let state = Arc::new(MockState {
            token_lifetime,
            ..MockState::default()
        });
        let app = Router::new()
            .route("/storage/v1/b/{bucket}/o", get(list_objects))
            .route("/storage/v1/b/{bucket}/o/{object}", get(get_object))
            .route("/token", post(issue_token))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn token_uri(&self) -> String {
        format!("{}/token", self.base_url)
    }

    /// Add an object resource as the JSON API reports it
    pub fn insert(&self, bucket: &str, name: &str, size: u64, created: &str, updated: &str) {
        self.insert_raw(
            bucket,
            json!({
                "kind": "storage#object",
                "name": name,
                "bucket": bucket,
                "size": size.to_string(),
                "timeCreated": created,
                "updated": updated,
            }),
        );
    }

    pub fn insert_raw(&self, bucket: &str, resource: Value) {
        self.state
            .buckets
            .lock()
            .entry(bucket.to_string())
            .or_default()
            .push(resource);
    }

    pub fn create_bucket(&self, bucket: &str) {
        self.state.buckets.lock().entry(bucket.to_string()).or_default();
    }
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(rename = "pageToken")]
    page_token: Option<String>,
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": { "code": 404, "message": message } })),
    )
        .into_response()
}

fn record_authorization(state: &MockState, headers: &HeaderMap) {
    let value = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.authorization.lock().push(value);
}

async fn list_objects(
    State(state): State<Arc<MockState>>,
    Path(bucket): Path<String>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Response {
    state.list_requests.fetch_add(1, Ordering::SeqCst);
    record_authorization(&state, &headers);
    if state.fail_listing.load(Ordering::SeqCst) {
        return (StatusCode::SERVICE_UNAVAILABLE, "backend unavailable").into_response();
    }

    let buckets = state.buckets.lock();
    let Some(objects) = buckets.get(&bucket) else {
        return not_found("The specified bucket does not exist.");
    };
    let start = params
        .page_token
        .and_then(|token| token.parse::<usize>().ok())
        .unwrap_or(0);
    let end = (start + PAGE_SIZE).min(objects.len());

    let mut page = json!({ "kind": "storage#objects" });
    // GCS omits `items` on an empty page
    if start < end {
        page["items"] = Value::Array(objects[start..end].to_vec());
    }
    if end < objects.len() {
        page["nextPageToken"] = Value::String(end.to_string());
    }
    Json(page).into_response()
}

async fn get_object(
    State(state): State<Arc<MockState>>,
    Path((bucket, object)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    record_authorization(&state, &headers);
    let buckets = state.buckets.lock();
    buckets
        .get(&bucket)
        .and_then(|objects| objects.iter().find(|o| o["name"] == object.as_str()))
        .map_or_else(
            || not_found("No such object."),
            |resource| Json(resource.clone()).into_response(),
        )
}

async fn issue_token(
    State(state): State<Arc<MockState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let issued = state.token_requests.fetch_add(1, Ordering::SeqCst) + 1;
    *state.last_grant_type.lock() = form.get("grant_type").cloned();
    Json(json!({
        "access_token": format!("tok-{issued}"),
        "expires_in": state.token_lifetime,
        "token_type": "Bearer",
    }))
    .into_response()
}
