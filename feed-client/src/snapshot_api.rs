use crate::metrics::{MetricsCollector, RequestMetrics};
use engageboard_core::{CoreError, SnapshotError};
use reqwest::Client;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Client for the live leaderboard snapshot service (read tier 1).
#[derive(Debug, Clone)]
pub struct SnapshotApiClient {
    http_client: Client,
    url: Url,
    metrics: MetricsCollector,
}

impl SnapshotApiClient {
    pub fn new(
        url: &str,
        user_agent: &str,
        timeout: Duration,
        metrics: MetricsCollector,
    ) -> Result<Self, CoreError> {
        let url = Url::parse(url).map_err(|e| CoreError::InvalidInput {
            message: format!("Invalid snapshot URL {}: {}", url, e),
        })?;
        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            url,
            metrics,
        })
    }

    /// Returns the `data` array of a successful snapshot response. Entries are
    /// left as JSON so fields this crate does not model survive the merge with
    /// the local cache.
    pub async fn fetch_snapshot(&self) -> Result<Vec<Value>, CoreError> {
        let endpoint = self.url.path().to_string();
        let start_time = Instant::now();

        let outcome = self.request_snapshot().await;

        self.metrics
            .record_request(RequestMetrics {
                endpoint,
                status_code: match &outcome {
                    Ok(_) => Some(200),
                    Err(SnapshotFetchFailure::Status(status)) => Some(*status),
                    Err(_) => None,
                },
                response_time: start_time.elapsed(),
                success: outcome.is_ok(),
                timed_out: matches!(&outcome, Err(SnapshotFetchFailure::Timeout)),
                error_type: outcome.as_ref().err().map(|e| e.kind().to_string()),
            })
            .await;

        outcome.map_err(|failure| {
            warn!("Remote snapshot fetch failed: {}", failure);
            CoreError::Snapshot(SnapshotError::RemoteSnapshotUnavailable {
                reason: failure.to_string(),
            })
        })
    }

    async fn request_snapshot(&self) -> Result<Vec<Value>, SnapshotFetchFailure> {
        let response = self
            .http_client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SnapshotFetchFailure::Timeout
                } else {
                    SnapshotFetchFailure::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnapshotFetchFailure::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SnapshotFetchFailure::Body(e.to_string()))?;
        let entries = extract_snapshot_entries(body)?;
        debug!("Remote snapshot returned {} entries", entries.len());
        Ok(entries)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SnapshotFetchFailure {
    Timeout,
    Network(String),
    Status(u16),
    Body(String),
    NotSuccessful,
    MissingData,
}

impl SnapshotFetchFailure {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            SnapshotFetchFailure::Timeout => "SNAPSHOT_TIMEOUT",
            SnapshotFetchFailure::Network(_) => "SNAPSHOT_NETWORK",
            SnapshotFetchFailure::Status(_) => "SNAPSHOT_STATUS",
            SnapshotFetchFailure::Body(_) => "SNAPSHOT_BODY",
            SnapshotFetchFailure::NotSuccessful => "SNAPSHOT_NOT_SUCCESSFUL",
            SnapshotFetchFailure::MissingData => "SNAPSHOT_MISSING_DATA",
        }
    }
}

impl std::fmt::Display for SnapshotFetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotFetchFailure::Timeout => write!(f, "request timed out"),
            SnapshotFetchFailure::Network(reason) => write!(f, "network error: {}", reason),
            SnapshotFetchFailure::Status(status) => write!(f, "status {}", status),
            SnapshotFetchFailure::Body(reason) => write!(f, "unreadable body: {}", reason),
            SnapshotFetchFailure::NotSuccessful => write!(f, "response reported success=false"),
            SnapshotFetchFailure::MissingData => write!(f, "response has no data array"),
        }
    }
}

/// `{ success: true, data: [...] }` is required. Emptiness and per-entry
/// shape are judged by the resolver.
pub(crate) fn extract_snapshot_entries(body: Value) -> Result<Vec<Value>, SnapshotFetchFailure> {
    let Value::Object(mut object) = body else {
        return Err(SnapshotFetchFailure::MissingData);
    };
    if object.get("success").and_then(Value::as_bool) != Some(true) {
        return Err(SnapshotFetchFailure::NotSuccessful);
    }
    match object.remove("data") {
        Some(Value::Array(entries)) => Ok(entries),
        _ => Err(SnapshotFetchFailure::MissingData),
    }
}
