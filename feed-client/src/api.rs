use crate::metrics::{MetricsCollector, RequestMetrics};
use engageboard_core::{CoreError, ErrorExt, FeedApiError};
use reqwest::{Client, Response};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

/// Keys under which the posts API has been seen to wrap its array.
const POST_ARRAY_KEYS: &[&str] = &["tweets", "posts", "data"];

/// Client for the community posts API (the ingestion side).
#[derive(Debug, Clone)]
pub struct FeedApiClient {
    http_client: Client,
    base_url: Url,
    api_key: Option<String>,
    metrics: MetricsCollector,
}

impl FeedApiClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        user_agent: &str,
        timeout: Duration,
        metrics: MetricsCollector,
    ) -> Result<Self, CoreError> {
        let base_url = parse_base_url(base_url)?;
        let http_client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            api_key,
            metrics,
        })
    }

    async fn make_request(
        &self,
        endpoint: &str,
        query_params: &[(&str, String)],
    ) -> Result<Response, CoreError> {
        let url = self.base_url.join(endpoint.trim_start_matches('/')).map_err(|e| {
            CoreError::InvalidInput {
                message: format!("Invalid endpoint {}: {}", endpoint, e),
            }
        })?;
        let start_time = Instant::now();

        let mut request_builder = self.http_client.get(url).query(query_params);
        if let Some(key) = &self.api_key {
            request_builder = request_builder.header("X-API-Key", key);
        }

        info!("Making posts API request: GET {}", endpoint);
        let outcome = request_builder.send().await;

        let (status_code, timed_out) = match &outcome {
            Ok(response) => (Some(response.status().as_u16()), false),
            Err(e) => (None, e.is_timeout()),
        };
        let result = match outcome {
            Ok(response) => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.parse::<u64>().ok());
                classify_status(response.status().as_u16(), endpoint, retry_after)
                    .map(|_| response)
                    .map_err(CoreError::from)
            }
            Err(e) => {
                error!("Network error for GET {}: {}", endpoint, e);
                if e.is_timeout() {
                    Err(CoreError::FeedApi(FeedApiError::RequestTimeout))
                } else {
                    Err(CoreError::FeedApi(FeedApiError::UpstreamUnavailable {
                        endpoint: endpoint.to_string(),
                        reason: e.to_string(),
                    }))
                }
            }
        };

        self.metrics
            .record_request(RequestMetrics {
                endpoint: endpoint.to_string(),
                status_code,
                response_time: start_time.elapsed(),
                success: result.is_ok(),
                timed_out,
                error_type: result.as_ref().err().map(error_type),
            })
            .await;

        result
    }

    /// Fetch one window of raw posts for a community. The records are returned
    /// untouched; normalization happens downstream.
    pub async fn fetch_community_posts(
        &self,
        community_id: &str,
        limit: u32,
    ) -> Result<Vec<Value>, CoreError> {
        let endpoint = format!("/communities/{}/posts", community_id);
        let response = self
            .make_request(&endpoint, &[("limit", limit.to_string())])
            .await?;

        let body: Value = response.json().await.map_err(|e| {
            error!("Failed to parse posts for community {}: {}", community_id, e);
            FeedApiError::InvalidResponse {
                details: format!("Failed to parse posts for community {}", community_id),
            }
        })?;

        let posts = extract_posts(body)?;
        info!(
            "Retrieved {} raw posts for community {}",
            posts.len(),
            community_id
        );
        Ok(posts)
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }
}

fn parse_base_url(base_url: &str) -> Result<Url, CoreError> {
    // join() drops the last path segment unless the base ends in '/'
    let normalized = if base_url.ends_with('/') {
        base_url.to_string()
    } else {
        format!("{}/", base_url)
    };
    Url::parse(&normalized).map_err(|e| CoreError::InvalidInput {
        message: format!("Invalid base URL {}: {}", base_url, e),
    })
}

/// Metrics label for a failed request, e.g. `FEED_RATE_LIMIT`.
fn error_type(error: &CoreError) -> String {
    match error {
        CoreError::FeedApi(e) => e.error_code(),
        other => other.error_code(),
    }
}

/// Maps a non-success HTTP status to the feed error taxonomy.
pub fn classify_status(
    status: u16,
    endpoint: &str,
    retry_after: Option<u64>,
) -> Result<(), FeedApiError> {
    match status {
        200..=299 => {
            debug!("Request successful: {} {}", status, endpoint);
            Ok(())
        }
        401 | 403 => Err(FeedApiError::Unauthorized {
            endpoint: endpoint.to_string(),
        }),
        429 => {
            let retry_after = retry_after.unwrap_or(60);
            warn!("Rate limited, retry after {} seconds", retry_after);
            Err(FeedApiError::RateLimitExceeded { retry_after })
        }
        500..=599 => Err(FeedApiError::ServerError {
            status_code: status,
        }),
        _ => Err(FeedApiError::UpstreamUnavailable {
            endpoint: endpoint.to_string(),
            reason: format!("unexpected status {}", status),
        }),
    }
}

/// Accepts a bare array or an object wrapping one under a known key.
pub fn extract_posts(body: Value) -> Result<Vec<Value>, FeedApiError> {
    match body {
        Value::Array(posts) => Ok(posts),
        Value::Object(mut object) => POST_ARRAY_KEYS
            .iter()
            .find_map(|key| match object.remove(*key) {
                Some(Value::Array(posts)) => Some(posts),
                _ => None,
            })
            .ok_or_else(|| FeedApiError::InvalidResponse {
                details: "response object carries no post array".to_string(),
            }),
        _ => Err(FeedApiError::InvalidResponse {
            details: "response is neither an array nor an object".to_string(),
        }),
    }
}
