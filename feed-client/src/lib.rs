pub mod api;
pub mod metrics;
pub mod snapshot_api;


pub use api::{classify_status, extract_posts, FeedApiClient};
pub use metrics::{EndpointMetrics, FetchMetrics, MetricsCollector, RequestMetrics};
pub use snapshot_api::SnapshotApiClient;
