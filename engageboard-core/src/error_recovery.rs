//! Recovery strategies for the error taxonomy.
//!
//! The write path and the read path treat failures very differently: an
//! indexing run dies loudly on anything but a malformed record, while the read
//! path never lets an error escape. This module is the single place where an
//! error is mapped to what the caller does next.

use crate::{CoreError, DatabaseError, SnapshotError};

/// What a caller should do after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Drop the offending record and continue with the batch
    Skip,
    /// Move on to the next snapshot tier
    FallThrough,
    /// Present an empty result set with a non-live status
    Degrade,
    /// Abort the current operation and surface the error
    Fail,
}

impl RecoveryStrategy {
    /// Returns true if the caller keeps going after the error
    pub fn continues(&self) -> bool {
        !matches!(self, RecoveryStrategy::Fail)
    }
}

pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Determine the appropriate recovery strategy for a given error
    pub fn determine_strategy(error: &CoreError) -> RecoveryStrategy {
        match error {
            CoreError::MalformedRecord { .. } => RecoveryStrategy::Skip,

            CoreError::Snapshot(snapshot_error) => match snapshot_error {
                SnapshotError::RemoteSnapshotUnavailable { .. }
                | SnapshotError::CacheUnavailable { .. }
                | SnapshotError::StaticSnapshotUnavailable { .. } => RecoveryStrategy::FallThrough,
                SnapshotError::AllSourcesExhausted => RecoveryStrategy::Degrade,
            },

            // Unknown store state must never be mistaken for an empty board
            CoreError::Database(DatabaseError::StoreUnavailable { .. }) => RecoveryStrategy::Fail,
            CoreError::Database(_) => RecoveryStrategy::Fail,

            CoreError::FeedApi(_) | CoreError::Network(_) => RecoveryStrategy::Fail,

            CoreError::Config(_) | CoreError::InvalidInput { .. } => RecoveryStrategy::Fail,
        }
    }
}
