//! Read side of the leaderboard: the client-local snapshot cache and the
//! tiered resolver that decides which snapshot a viewer sees.

pub mod cache;
pub mod resolver;
pub mod session;
pub mod sources;


pub use cache::{
    CacheStorage, CachedSnapshot, FileCacheStorage, MemoryCacheStorage, SnapshotCache,
    SNAPSHOT_KEY, TIMESTAMP_KEY,
};
pub use resolver::{FallbackResolver, Resolution, SnapshotStatus, REMOTE_TIMEOUT};
pub use session::paint_then_refresh;
pub use sources::{FileStaticSnapshot, RemoteSnapshotSource, StaticSnapshotSource};
