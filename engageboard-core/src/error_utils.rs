use crate::error::*;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    /// Whether the caller can carry on without this result (skip the record,
    /// fall through to the next tier, or degrade to an empty board).
    fn is_recoverable(&self) -> bool;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::FeedApi(e) => {
                error!("Feed API error details: {:?}", e);
            }
            CoreError::Database(e) => {
                error!("Database error details: {:?}", e);
            }
            CoreError::Snapshot(e) => {
                error!("Snapshot error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_recoverable(&self) -> bool {
        match self {
            CoreError::Snapshot(e) => e.is_recoverable(),
            CoreError::MalformedRecord { .. } => true,
            _ => false,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::FeedApi(e) => e.user_friendly_message(),
            CoreError::Database(e) => e.user_friendly_message(),
            CoreError::Snapshot(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::MalformedRecord { reason } => {
                format!("A post was skipped because it could not be read: {}", reason)
            }
            CoreError::InvalidInput { .. } => {
                "Invalid input provided. Please check your input and try again.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::FeedApi(_) => "FEED_API".to_string(),
            CoreError::Database(_) => "DATABASE".to_string(),
            CoreError::Snapshot(_) => "SNAPSHOT".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::MalformedRecord { .. } => "MALFORMED_RECORD".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
        }
    }
}

impl ErrorExt for FeedApiError {
    fn log_error(&self) -> &Self {
        error!("FeedApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("FeedApiError (warning): {}", self);
        self
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            FeedApiError::UpstreamUnavailable { .. } => {
                "The posts service could not be reached. The next run will try again.".to_string()
            }
            FeedApiError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            FeedApiError::Unauthorized { .. } => {
                "The posts service rejected the API key. Please check your credentials.".to_string()
            }
            FeedApiError::RequestTimeout => {
                "Request to the posts service timed out.".to_string()
            }
            _ => "Posts service error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            FeedApiError::UpstreamUnavailable { .. } => "FEED_UPSTREAM_UNAVAILABLE".to_string(),
            FeedApiError::RequestTimeout => "FEED_TIMEOUT".to_string(),
            FeedApiError::RateLimitExceeded { .. } => "FEED_RATE_LIMIT".to_string(),
            FeedApiError::Unauthorized { .. } => "FEED_UNAUTHORIZED".to_string(),
            FeedApiError::InvalidResponse { .. } => "FEED_INVALID_RESPONSE".to_string(),
            FeedApiError::ServerError { .. } => "FEED_SERVER_ERROR".to_string(),
        }
    }
}

impl ErrorExt for DatabaseError {
    fn log_error(&self) -> &Self {
        error!("DatabaseError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("DatabaseError (warning): {}", self);
        self
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            DatabaseError::StoreUnavailable { .. } => {
                "Leaderboard storage is unavailable. Results are unknown, not empty.".to_string()
            }
            _ => "Database error occurred. Please try again.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            DatabaseError::StoreUnavailable { .. } => "DB_STORE_UNAVAILABLE".to_string(),
            DatabaseError::MigrationFailed { .. } => "DB_MIGRATION_FAILED".to_string(),
            DatabaseError::QueryFailed { .. } => "DB_QUERY_FAILED".to_string(),
            DatabaseError::TransactionFailed { .. } => "DB_TRANSACTION_FAILED".to_string(),
        }
    }
}

impl ErrorExt for SnapshotError {
    fn log_error(&self) -> &Self {
        error!("SnapshotError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("SnapshotError (warning): {}", self);
        self
    }

    fn is_recoverable(&self) -> bool {
        true
    }

    fn user_friendly_message(&self) -> String {
        match self {
            SnapshotError::RemoteSnapshotUnavailable { .. } => {
                "Live leaderboard is unavailable, showing saved results.".to_string()
            }
            SnapshotError::CacheUnavailable { .. } => {
                "No saved leaderboard found, showing bundled results.".to_string()
            }
            SnapshotError::StaticSnapshotUnavailable { .. } => {
                "Bundled leaderboard could not be read.".to_string()
            }
            SnapshotError::AllSourcesExhausted => {
                "Leaderboard is not available right now.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            SnapshotError::RemoteSnapshotUnavailable { .. } => {
                "SNAPSHOT_REMOTE_UNAVAILABLE".to_string()
            }
            SnapshotError::CacheUnavailable { .. } => "SNAPSHOT_CACHE_UNAVAILABLE".to_string(),
            SnapshotError::StaticSnapshotUnavailable { .. } => {
                "SNAPSHOT_STATIC_UNAVAILABLE".to_string()
            }
            SnapshotError::AllSourcesExhausted => "SNAPSHOT_EXHAUSTED".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::MissingField { field } => {
                format!("Required configuration field '{}' is missing.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            _ => "Configuration error occurred. Please check your settings.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

/// Logs an error together with its stable code and the message shown to users.
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn report_error(&self, error: &CoreError) {
        error.log_error();
        info!("Error code: {}", error.error_code());
        info!("User message: {}", error.user_friendly_message());
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
