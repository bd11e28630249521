use chrono::{DateTime, TimeZone, Utc};
use engageboard_core::SnapshotError;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Key holding the serialized snapshot array.
pub const SNAPSHOT_KEY: &str = "engageboard.leaderboard";
/// Key holding the capture time as epoch milliseconds in a decimal string.
pub const TIMESTAMP_KEY: &str = "engageboard.leaderboard.timestamp";

/// String key-value storage in the style of browser local storage.
pub trait CacheStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SnapshotError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SnapshotError>;
}

impl<T: CacheStorage + ?Sized> CacheStorage for &T {
    fn get(&self, key: &str) -> Result<Option<String>, SnapshotError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SnapshotError> {
        (**self).set(key, value)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SnapshotError> {
        let values = self.values.lock().map_err(|_| poisoned())?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SnapshotError> {
        let mut values = self.values.lock().map_err(|_| poisoned())?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

fn poisoned() -> SnapshotError {
    SnapshotError::CacheUnavailable {
        reason: "cache lock poisoned".to_string(),
    }
}

/// One JSON object on disk, rewritten whole on every `set`. A missing file
/// reads as an empty cache.
#[derive(Debug, Clone)]
pub struct FileCacheStorage {
    path: PathBuf,
}

impl FileCacheStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Map<String, Value>, SnapshotError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(cache_error(&self.path, e)),
        };
        match serde_json::from_str(&contents) {
            Ok(Value::Object(values)) => Ok(values),
            Ok(_) => Err(SnapshotError::CacheUnavailable {
                reason: format!("{} is not a JSON object", self.path.display()),
            }),
            Err(e) => Err(cache_error(&self.path, e)),
        }
    }
}

impl CacheStorage for FileCacheStorage {
    fn get(&self, key: &str) -> Result<Option<String>, SnapshotError> {
        let values = self.read_all()?;
        Ok(values.get(key).and_then(Value::as_str).map(str::to_string))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SnapshotError> {
        let mut values = self.read_all().unwrap_or_else(|e| {
            warn!("Discarding unreadable cache file: {}", e);
            Map::new()
        });
        values.insert(key.to_string(), Value::String(value.to_string()));

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| cache_error(&self.path, e))?;
        }
        let serialized = serde_json::to_string(&Value::Object(values))
            .map_err(|e| cache_error(&self.path, e))?;
        std::fs::write(&self.path, serialized).map_err(|e| cache_error(&self.path, e))
    }
}

fn cache_error(path: &Path, error: impl std::fmt::Display) -> SnapshotError {
    SnapshotError::CacheUnavailable {
        reason: format!("{}: {}", path.display(), error),
    }
}

/// What the cache tier hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSnapshot {
    pub entries: Vec<Value>,
    pub captured_at: Option<DateTime<Utc>>,
}

impl CachedSnapshot {
    /// Whole hours since capture, floored. `None` when the timestamp is
    /// missing or in the future.
    pub fn age_hours(&self, now: DateTime<Utc>) -> Option<u64> {
        let captured_at = self.captured_at?;
        let age = now.signed_duration_since(captured_at);
        u64::try_from(age.num_hours()).ok()
    }
}

/// The client-local snapshot cache, shared by the startup paint and the
/// resolver.
pub struct SnapshotCache<S> {
    storage: S,
}

impl<S: CacheStorage> SnapshotCache<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// `Ok(None)` for an absent or empty snapshot. A stored value that does
    /// not parse as an array is a `CacheUnavailable` error.
    pub fn load(&self) -> Result<Option<CachedSnapshot>, SnapshotError> {
        let Some(raw) = self.storage.get(SNAPSHOT_KEY)? else {
            return Ok(None);
        };
        let entries = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => {
                return Err(SnapshotError::CacheUnavailable {
                    reason: "cached snapshot is not an array".to_string(),
                })
            }
            Err(e) => {
                return Err(SnapshotError::CacheUnavailable {
                    reason: format!("cached snapshot is not valid JSON: {}", e),
                })
            }
        };
        if entries.is_empty() {
            return Ok(None);
        }

        let captured_at = self
            .storage
            .get(TIMESTAMP_KEY)?
            .and_then(|millis| millis.trim().parse::<i64>().ok())
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single());
        debug!(entries = entries.len(), ?captured_at, "Loaded cached snapshot");

        Ok(Some(CachedSnapshot {
            entries,
            captured_at,
        }))
    }

    /// Entries as last cached, or empty. For merging, where an unreadable
    /// cache just means there is nothing to carry over.
    pub fn entries_or_empty(&self) -> Vec<Value> {
        match self.load() {
            Ok(Some(cached)) => cached.entries,
            Ok(None) => Vec::new(),
            Err(e) => {
                debug!("No cached entries to merge: {}", e);
                Vec::new()
            }
        }
    }

    /// Writes the array and then its timestamp. If the timestamp write fails
    /// the previous array is put back, so an array is never paired with
    /// another snapshot's capture time.
    pub fn store(&self, entries: &[Value], captured_at: DateTime<Utc>) -> Result<(), SnapshotError> {
        let serialized =
            serde_json::to_string(entries).map_err(|e| SnapshotError::CacheUnavailable {
                reason: e.to_string(),
            })?;
        let previous = self.storage.get(SNAPSHOT_KEY).ok().flatten();
        self.storage.set(SNAPSHOT_KEY, &serialized)?;

        if let Err(e) = self
            .storage
            .set(TIMESTAMP_KEY, &captured_at.timestamp_millis().to_string())
        {
            // "[]" reads back as an absent snapshot
            let restore = previous.as_deref().unwrap_or("[]");
            if let Err(rollback) = self.storage.set(SNAPSHOT_KEY, restore) {
                warn!("Could not restore cached snapshot: {}", rollback);
            }
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_store_then_load() {
        let cache = SnapshotCache::new(MemoryCacheStorage::new());
        assert_eq!(cache.load().unwrap(), None);

        let captured_at = Utc.timestamp_millis_opt(1_709_640_000_000).unwrap();
        cache
            .store(&[json!({ "handle": "@a", "score": 3 })], captured_at)
            .unwrap();

        let cached = cache.load().unwrap().unwrap();
        assert_eq!(cached.entries.len(), 1);
        assert_eq!(cached.captured_at, Some(captured_at));
        assert_eq!(
            cache.storage().get(TIMESTAMP_KEY).unwrap().as_deref(),
            Some("1709640000000")
        );
    }

    /// Accepts every write except the capture timestamp.
    struct TimestampRejecting(MemoryCacheStorage);

    impl CacheStorage for TimestampRejecting {
        fn get(&self, key: &str) -> Result<Option<String>, SnapshotError> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), SnapshotError> {
            if key == TIMESTAMP_KEY {
                return Err(SnapshotError::CacheUnavailable {
                    reason: "quota exceeded".to_string(),
                });
            }
            self.0.set(key, value)
        }
    }

    #[test]
    fn test_failed_timestamp_write_keeps_previous_pair() {
        let storage = MemoryCacheStorage::new();
        let old_capture = Utc.timestamp_millis_opt(1_709_640_000_000).unwrap();
        SnapshotCache::new(&storage)
            .store(&[json!({ "handle": "@old", "score": 1 })], old_capture)
            .unwrap();

        let cache = SnapshotCache::new(TimestampRejecting(storage));
        let result = cache.store(&[json!({ "handle": "@new", "score": 9 })], Utc::now());
        assert!(matches!(
            result,
            Err(SnapshotError::CacheUnavailable { .. })
        ));

        let cached = cache.load().unwrap().unwrap();
        assert_eq!(cached.entries, vec![json!({ "handle": "@old", "score": 1 })]);
        assert_eq!(cached.captured_at, Some(old_capture));
    }

    #[test]
    fn test_failed_first_store_leaves_cache_empty() {
        let cache = SnapshotCache::new(TimestampRejecting(MemoryCacheStorage::new()));
        assert!(cache
            .store(&[json!({ "handle": "@new", "score": 9 })], Utc::now())
            .is_err());
        assert_eq!(cache.load().unwrap(), None);
    }

    #[test]
    fn test_age_is_floored_hours() {
        let now = Utc::now();
        let cached = CachedSnapshot {
            entries: vec![],
            captured_at: Some(now - Duration::minutes(179)),
        };
        assert_eq!(cached.age_hours(now), Some(2));

        let unknown = CachedSnapshot {
            entries: vec![],
            captured_at: None,
        };
        assert_eq!(unknown.age_hours(now), None);
    }

    #[test]
    fn test_empty_array_reads_as_absent() {
        let storage = MemoryCacheStorage::new();
        storage.set(SNAPSHOT_KEY, "[]").unwrap();
        assert_eq!(SnapshotCache::new(storage).load().unwrap(), None);
    }

    #[test]
    fn test_garbage_timestamp_means_unknown_age() {
        let storage = MemoryCacheStorage::new();
        storage.set(SNAPSHOT_KEY, r#"[{"handle":"@a"}]"#).unwrap();
        storage.set(TIMESTAMP_KEY, "yesterday").unwrap();

        let cached = SnapshotCache::new(storage).load().unwrap().unwrap();
        assert_eq!(cached.captured_at, None);
    }

    #[test]
    fn test_corrupt_snapshot_is_cache_unavailable() {
        let storage = MemoryCacheStorage::new();
        storage.set(SNAPSHOT_KEY, "{not json").unwrap();
        let cache = SnapshotCache::new(storage);

        assert!(matches!(
            cache.load(),
            Err(SnapshotError::CacheUnavailable { .. })
        ));
        assert!(cache.entries_or_empty().is_empty());
    }

    #[test]
    fn test_file_storage_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "engageboard_cache_{}.json",
            uuid::Uuid::new_v4()
        ));
        let storage = FileCacheStorage::new(&path);
        assert_eq!(storage.get(SNAPSHOT_KEY).unwrap(), None);

        storage.set(SNAPSHOT_KEY, "[1]").unwrap();
        storage.set(TIMESTAMP_KEY, "5").unwrap();

        let reopened = FileCacheStorage::new(&path);
        assert_eq!(reopened.get(SNAPSHOT_KEY).unwrap().as_deref(), Some("[1]"));
        assert_eq!(reopened.get(TIMESTAMP_KEY).unwrap().as_deref(), Some("5"));

        let _ = std::fs::remove_file(&path);
    }
}
