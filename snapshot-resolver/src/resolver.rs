use crate::cache::{CacheStorage, SnapshotCache};
use crate::sources::{RemoteSnapshotSource, StaticSnapshotSource};
use chrono::Utc;
use database::merge_with_cache;
use engageboard_core::{
    CoreError, ErrorExt, ErrorRecovery, RecoveryStrategy, SnapshotEntry, SnapshotError,
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on one remote snapshot request.
pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStatus {
    Live,
    /// Stale data from the local cache; `None` when its age is unknown.
    Cached { age_hours: Option<u64> },
    Bundled,
    Unavailable,
}

impl SnapshotStatus {
    pub fn label(&self) -> String {
        match self {
            SnapshotStatus::Live => "live".to_string(),
            SnapshotStatus::Cached {
                age_hours: Some(hours),
            } => format!("cached ({}h old)", hours),
            SnapshotStatus::Cached { age_hours: None } => "cached (age unknown)".to_string(),
            SnapshotStatus::Bundled => "bundled".to_string(),
            SnapshotStatus::Unavailable => "unavailable".to_string(),
        }
    }
}

/// A snapshot ready to display and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub entries: Vec<SnapshotEntry>,
    pub status: SnapshotStatus,
}

impl Resolution {
    pub fn unavailable() -> Self {
        Self {
            entries: Vec::new(),
            status: SnapshotStatus::Unavailable,
        }
    }

    pub fn is_live(&self) -> bool {
        self.status == SnapshotStatus::Live
    }
}

/// Tries remote, then cache, then the bundled snapshot, strictly in that
/// order. Never returns an error: total failure is an empty
/// [`SnapshotStatus::Unavailable`] resolution.
pub struct FallbackResolver<R, T, S> {
    remote: Option<R>,
    static_source: T,
    cache: SnapshotCache<S>,
    remote_timeout: Duration,
}

impl<R, T, S> FallbackResolver<R, T, S>
where
    R: RemoteSnapshotSource,
    T: StaticSnapshotSource,
    S: CacheStorage,
{
    pub fn new(remote: Option<R>, static_source: T, cache: SnapshotCache<S>) -> Self {
        Self {
            remote,
            static_source,
            cache,
            remote_timeout: REMOTE_TIMEOUT,
        }
    }

    pub fn with_remote_timeout(mut self, remote_timeout: Duration) -> Self {
        self.remote_timeout = remote_timeout;
        self
    }

    pub fn cache(&self) -> &SnapshotCache<S> {
        &self.cache
    }

    pub async fn resolve(&self) -> Resolution {
        match self.try_remote().await {
            Ok(resolution) => return resolution,
            Err(e) => fall_through(&e),
        }

        match self.cached() {
            Ok(Some(resolution)) => return resolution,
            Ok(None) => debug!("Cache tier is empty"),
            Err(e) => fall_through(&e),
        }

        match self.try_static().await {
            Ok(resolution) => return resolution,
            Err(e) => fall_through(&e),
        }

        let exhausted = CoreError::Snapshot(SnapshotError::AllSourcesExhausted);
        debug_assert_eq!(
            ErrorRecovery::determine_strategy(&exhausted),
            RecoveryStrategy::Degrade
        );
        exhausted.log_warn();
        Resolution::unavailable()
    }

    /// Tier 2 on its own. Also used for the instant paint at startup.
    pub fn cached(&self) -> Result<Option<Resolution>, CoreError> {
        let Some(cached) = self.cache.load()? else {
            return Ok(None);
        };
        let entries = parse_entries(&cached.entries).map_err(|reason| {
            SnapshotError::CacheUnavailable {
                reason: format!("cached snapshot has unexpected shape: {}", reason),
            }
        })?;
        let status = SnapshotStatus::Cached {
            age_hours: cached.age_hours(Utc::now()),
        };
        info!(entries = entries.len(), status = %status.label(), "Serving cached snapshot");
        Ok(Some(Resolution { entries, status }))
    }

    async fn try_remote(&self) -> Result<Resolution, CoreError> {
        let Some(remote) = &self.remote else {
            return Err(remote_unavailable("no snapshot endpoint configured"));
        };

        let incoming = tokio::time::timeout(self.remote_timeout, remote.fetch_snapshot())
            .await
            .map_err(|_| {
                remote_unavailable(format!(
                    "timed out after {}s",
                    self.remote_timeout.as_secs()
                ))
            })??;

        if incoming.is_empty() {
            return Err(remote_unavailable("snapshot is empty"));
        }
        parse_entries(&incoming).map_err(remote_unavailable)?;

        let merged = merge_with_cache(&self.cache.entries_or_empty(), &incoming);
        let entries = parse_entries(&merged).map_err(remote_unavailable)?;
        if let Err(e) = self.cache.store(&merged, Utc::now()) {
            warn!("Could not cache live snapshot: {}", e);
        }

        info!(entries = entries.len(), "Serving live snapshot");
        Ok(Resolution {
            entries,
            status: SnapshotStatus::Live,
        })
    }

    async fn try_static(&self) -> Result<Resolution, CoreError> {
        let mut bundled = self.static_source.load_static().await?;
        if bundled.is_empty() {
            return Err(SnapshotError::StaticSnapshotUnavailable {
                path: "bundled snapshot".to_string(),
                reason: "snapshot is empty".to_string(),
            }
            .into());
        }

        // position in the bundled array is the rank
        for (position, entry) in bundled.iter_mut().enumerate() {
            if let Value::Object(object) = entry {
                object.insert("rank".to_string(), Value::from(position + 1));
            }
        }
        let entries = parse_entries(&bundled).map_err(|reason| {
            SnapshotError::StaticSnapshotUnavailable {
                path: "bundled snapshot".to_string(),
                reason,
            }
        })?;

        if let Err(e) = self.cache.store(&bundled, Utc::now()) {
            warn!("Could not cache bundled snapshot: {}", e);
        }

        info!(entries = entries.len(), "Serving bundled snapshot");
        Ok(Resolution {
            entries,
            status: SnapshotStatus::Bundled,
        })
    }
}

fn remote_unavailable(reason: impl Into<String>) -> CoreError {
    CoreError::Snapshot(SnapshotError::RemoteSnapshotUnavailable {
        reason: reason.into(),
    })
}

fn fall_through(error: &CoreError) {
    match ErrorRecovery::determine_strategy(error) {
        RecoveryStrategy::FallThrough => {
            warn!(code = %error.error_code(), "Snapshot tier failed, falling through: {}", error);
        }
        strategy => {
            warn!(?strategy, "Unexpected error on the read path, falling through: {}", error);
        }
    }
}

/// Every element must be an object with a non-empty string `handle`.
fn parse_entries(values: &[Value]) -> Result<Vec<SnapshotEntry>, String> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let has_handle = value
                .get("handle")
                .and_then(Value::as_str)
                .is_some_and(|handle| !handle.is_empty());
            if !has_handle {
                return Err(format!("entry {} has no handle", index));
            }
            serde_json::from_value::<SnapshotEntry>(value.clone())
                .map_err(|e| format!("entry {}: {}", index, e))
        })
        .collect()
}
