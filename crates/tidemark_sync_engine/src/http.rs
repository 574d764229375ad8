//! HTTP implementation of [`RemoteApi`].
//!
//! The actual HTTP client is abstracted via a trait so the engine does not
//! pick an HTTP library for the host application.

use crate::error::{RemoteError, RemoteResult};
use crate::remote::RemoteApi;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tidemark_sync_protocol::{DeltaSet, EntityKind, MutationId, Record, Timestamp};

/// Header carrying the mutation id on replays.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP method used by [`HttpRemote`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL.
    pub url: String,
    /// Extra headers.
    pub headers: Vec<(String, String)>,
    /// JSON body, if any.
    pub body: Option<Vec<u8>>,
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this trait on top of the host's HTTP library. Transport-level
/// failures are returned as `Err` and become [`RemoteError::Network`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;
}

#[async_trait]
impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        (**self).send(request).await
    }
}

/// [`RemoteApi`] over a JSON HTTP API.
///
/// Endpoints, relative to the base URL:
/// - `GET /sync/changes?since=N`
/// - `POST /{kind}`
/// - `PATCH /{kind}/{id}`
/// - `DELETE /{kind}/{id}`
pub struct HttpRemote<C: HttpClient> {
    base_url: String,
    client: C,
    timeout: Duration,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpRemote<C> {
    /// Creates a remote for `base_url` (e.g. `https://api.example.com`).
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout: DEFAULT_TIMEOUT,
            last_error: RwLock::new(None),
        }
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    async fn execute(&self, request: HttpRequest) -> RemoteResult<HttpResponse> {
        let method = request.method;
        let url = request.url.clone();

        let result = match tokio::time::timeout(self.timeout, self.client.send(request)).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(RemoteError::Network(e)),
            Err(_) => Err(RemoteError::Timeout),
        };

        match &result {
            Ok(response) => {
                tracing::debug!(?method, %url, status = response.status, "http request finished");
                *self.last_error.write() = None;
            }
            Err(e) => {
                tracing::debug!(?method, %url, error = %e, "http request failed");
                *self.last_error.write() = Some(e.to_string());
            }
        }
        result
    }

    fn mutation_request(
        &self,
        method: HttpMethod,
        path: String,
        key: MutationId,
        body: Option<Vec<u8>>,
    ) -> HttpRequest {
        HttpRequest {
            method,
            url: format!("{}{}", self.base_url, path),
            headers: vec![(IDEMPOTENCY_HEADER.to_string(), key.to_string())],
            body,
        }
    }

    fn check_status(response: &HttpResponse) -> RemoteResult<()> {
        if response.is_success() {
            return Ok(());
        }
        Err(RemoteError::Rejected {
            status: response.status,
            message: String::from_utf8_lossy(&response.body).into_owned(),
        })
    }
}

/// Encodes a record id as a single URL path segment.
fn path_segment(id: &str) -> String {
    match id {
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(id).into_owned(),
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> RemoteResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| RemoteError::Decode(e.to_string()))
}

#[async_trait]
impl<C: HttpClient> RemoteApi for HttpRemote<C> {
    async fn get_changes(&self, since: Timestamp) -> RemoteResult<DeltaSet> {
        let request = HttpRequest {
            method: HttpMethod::Get,
            url: format!("{}/sync/changes?since={}", self.base_url, since),
            headers: Vec::new(),
            body: None,
        };
        let response = self.execute(request).await?;
        Self::check_status(&response)?;

        let delta: DeltaSet = serde_json::from_slice(&response.body)
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        if !delta.ignored_partitions().is_empty() {
            tracing::warn!(
                partitions = ?delta.ignored_partitions(),
                "ignoring delta partitions for unknown kinds"
            );
        }
        Ok(delta)
    }

    async fn create(
        &self,
        kind: EntityKind,
        record: &Record,
        key: MutationId,
    ) -> RemoteResult<()> {
        let body = to_json(record)?;
        let request = self.mutation_request(HttpMethod::Post, format!("/{kind}"), key, Some(body));
        let response = self.execute(request).await?;
        Self::check_status(&response)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        changes: &Map<String, Value>,
        key: MutationId,
    ) -> RemoteResult<()> {
        let request = self.mutation_request(
            HttpMethod::Patch,
            format!("/{kind}/{}", path_segment(id)),
            key,
            Some(to_json(changes)?),
        );
        let response = self.execute(request).await?;
        Self::check_status(&response)
    }

    async fn delete(&self, kind: EntityKind, id: &str, key: MutationId) -> RemoteResult<()> {
        let path = format!("/{kind}/{}", path_segment(id));
        let request = self.mutation_request(HttpMethod::Delete, path, key, None);
        let response = self.execute(request).await?;
        // Already gone counts as deleted
        if response.status == 404 {
            return Ok(());
        }
        Self::check_status(&response)
    }
}

impl<C: HttpClient> std::fmt::Debug for HttpRemote<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemote")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
