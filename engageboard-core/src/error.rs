use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Feed API error: {0}")]
    FeedApi(#[from] FeedApiError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Malformed record: {reason}")]
    MalformedRecord { reason: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl CoreError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        CoreError::MalformedRecord {
            reason: reason.into(),
        }
    }

    pub fn store_unavailable(reason: impl Into<String>) -> Self {
        CoreError::Database(DatabaseError::StoreUnavailable {
            reason: reason.into(),
        })
    }
}

/// Failures talking to the upstream community posts API. Any of these aborts
/// the indexing run that hit it.
#[derive(Error, Debug, Clone)]
pub enum FeedApiError {
    #[error("Upstream unavailable at {endpoint}: {reason}")]
    UpstreamUnavailable { endpoint: String, reason: String },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Unauthorized request to {endpoint}")]
    Unauthorized { endpoint: String },

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Migration failed: {migration}")]
    MigrationFailed { migration: String },

    #[error("Query execution failed: {query}")]
    QueryFailed { query: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },
}

/// Read-path failures. None of these escape the fallback resolver.
#[derive(Error, Debug, Clone)]
pub enum SnapshotError {
    #[error("Remote snapshot unavailable: {reason}")]
    RemoteSnapshotUnavailable { reason: String },

    #[error("Local cache unavailable: {reason}")]
    CacheUnavailable { reason: String },

    #[error("Static snapshot unavailable at {path}: {reason}")]
    StaticSnapshotUnavailable { path: String, reason: String },

    #[error("All snapshot sources exhausted")]
    AllSourcesExhausted,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
