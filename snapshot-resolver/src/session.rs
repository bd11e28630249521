use crate::cache::CacheStorage;
use crate::resolver::{FallbackResolver, Resolution};
use crate::sources::{RemoteSnapshotSource, StaticSnapshotSource};
use engageboard_core::ErrorExt;
use tracing::debug;

/// Startup flow: paint whatever the cache holds right away, then run the full
/// resolution and paint its result. The second paint always replaces the
/// first. Returns the final resolution.
pub async fn paint_then_refresh<R, T, S, F>(
    resolver: &FallbackResolver<R, T, S>,
    mut paint: F,
) -> Resolution
where
    R: RemoteSnapshotSource,
    T: StaticSnapshotSource,
    S: CacheStorage,
    F: FnMut(&Resolution),
{
    match resolver.cached() {
        Ok(Some(instant)) => paint(&instant),
        Ok(None) => debug!("Nothing cached for the instant paint"),
        Err(e) => {
            e.log_warn();
        }
    }

    let resolved = resolver.resolve().await;
    paint(&resolved);
    resolved
}
