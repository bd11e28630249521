use engageboard_core::{CoreError, SnapshotError};
use feed_client::SnapshotApiClient;
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

/// Tier 1: the live snapshot service.
pub trait RemoteSnapshotSource {
    async fn fetch_snapshot(&self) -> Result<Vec<Value>, CoreError>;
}

impl RemoteSnapshotSource for SnapshotApiClient {
    async fn fetch_snapshot(&self) -> Result<Vec<Value>, CoreError> {
        SnapshotApiClient::fetch_snapshot(self).await
    }
}

/// Tier 3: the snapshot bundled with the deployment. Its entries carry no
/// `rank`.
pub trait StaticSnapshotSource {
    async fn load_static(&self) -> Result<Vec<Value>, SnapshotError>;
}

#[derive(Debug, Clone)]
pub struct FileStaticSnapshot {
    path: PathBuf,
}

impl FileStaticSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StaticSnapshotSource for FileStaticSnapshot {
    async fn load_static(&self) -> Result<Vec<Value>, SnapshotError> {
        let unavailable = |reason: String| SnapshotError::StaticSnapshotUnavailable {
            path: self.path.display().to_string(),
            reason,
        };

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        match serde_json::from_str::<Value>(&contents) {
            Ok(Value::Array(entries)) => {
                debug!(entries = entries.len(), path = %self.path.display(), "Read static snapshot");
                Ok(entries)
            }
            Ok(_) => Err(unavailable("not a JSON array".to_string())),
            Err(e) => Err(unavailable(e.to_string())),
        }
    }
}
