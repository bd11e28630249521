use crate::{ConfigError, CoreError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const ENV_POSTS_API_URL: &str = "ENGAGEBOARD_POSTS_API_URL";
pub const ENV_POSTS_API_KEY: &str = "ENGAGEBOARD_POSTS_API_KEY";
pub const ENV_COMMUNITY_ID: &str = "ENGAGEBOARD_COMMUNITY_ID";
pub const ENV_DATABASE_URL: &str = "ENGAGEBOARD_DATABASE_URL";
pub const ENV_SNAPSHOT_URL: &str = "ENGAGEBOARD_SNAPSHOT_URL";

/// Settings for every command. The ingestion fields (`posts_api_url`,
/// `community_id`) may be blank for read-only commands and are checked by
/// [`AppConfig::validate_ingestion`] before indexing.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub posts_api_url: String,
    #[serde(default)]
    pub posts_api_key: Option<String>,
    #[serde(default)]
    pub community_id: String,
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default)]
    pub snapshot_api_url: Option<String>,
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_static_snapshot_path")]
    pub static_snapshot_path: PathBuf,
    #[serde(default = "default_polling_interval_minutes")]
    pub polling_interval_minutes: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_fetch_limit() -> u32 {
    100
}

fn default_database_url() -> String {
    "sqlite://engageboard.db".to_string()
}

fn default_remote_timeout_secs() -> u64 {
    15
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("leaderboard-cache.json")
}

fn default_static_snapshot_path() -> PathBuf {
    PathBuf::from("static/leaderboard.json")
}

fn default_polling_interval_minutes() -> u64 {
    60
}

fn default_user_agent() -> String {
    "engageboard/0.1".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            posts_api_url: String::new(),
            posts_api_key: None,
            community_id: String::new(),
            fetch_limit: default_fetch_limit(),
            database_url: default_database_url(),
            snapshot_api_url: None,
            remote_timeout_secs: default_remote_timeout_secs(),
            cache_path: default_cache_path(),
            static_snapshot_path: default_static_snapshot_path(),
            polling_interval_minutes: default_polling_interval_minutes(),
            user_agent: default_user_agent(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file when given, otherwise from the environment alone.
    /// Environment overrides are applied in both cases.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, CoreError> {
        let contents = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, CoreError> {
        let config: AppConfig = toml::from_str(contents).map_err(ConfigError::Parse)?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(ENV_POSTS_API_URL) {
            self.posts_api_url = url;
        }
        if let Ok(id) = std::env::var(ENV_COMMUNITY_ID) {
            self.community_id = id;
        }
        if let Ok(key) = std::env::var(ENV_POSTS_API_KEY) {
            self.posts_api_key = Some(key);
        }
        if let Ok(url) = std::env::var(ENV_DATABASE_URL) {
            self.database_url = url;
        }
        if let Ok(url) = std::env::var(ENV_SNAPSHOT_URL) {
            self.snapshot_api_url = Some(url);
        }
    }

    /// Checks shared by every command.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.fetch_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "fetch_limit".to_string(),
                value: self.fetch_limit.to_string(),
            }
            .into());
        }
        if self.remote_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "remote_timeout_secs".to_string(),
                value: self.remote_timeout_secs.to_string(),
            }
            .into());
        }
        if self.polling_interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "polling_interval_minutes".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Checks for `index` and `watch`, which need the posts API.
    pub fn validate_ingestion(&self) -> Result<(), CoreError> {
        if self.posts_api_url.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "posts_api_url".to_string(),
            }
            .into());
        }
        if self.community_id.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "community_id".to_string(),
            }
            .into());
        }
        if url_scheme(&self.posts_api_url).is_none() {
            return Err(ConfigError::ValidationFailed {
                reason: format!("posts_api_url '{}' is not an http(s) URL", self.posts_api_url),
            }
            .into());
        }
        Ok(())
    }
}

fn url_scheme(url: &str) -> Option<&str> {
    let (scheme, _) = url.split_once("://")?;
    matches!(scheme, "http" | "https").then_some(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        posts_api_url = "https://api.example.com"
        community_id = "1493446837214187523"
    "#;

    #[test]
    fn test_defaults_applied() {
        let config = AppConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.fetch_limit, 100);
        assert_eq!(config.remote_timeout_secs, 15);
        assert_eq!(config.polling_interval_minutes, 60);
        assert_eq!(config.database_url, "sqlite://engageboard.db");
        assert_eq!(config.static_snapshot_path, PathBuf::from("static/leaderboard.json"));
        assert!(config.validate().is_ok());
        assert!(config.validate_ingestion().is_ok());
    }

    #[test]
    fn test_read_only_config_without_ingestion_fields() {
        let contents = r#"
            snapshot_api_url = "https://board.example.com/api/leaderboard"
            cache_path = "cache.json"
        "#;
        let config = AppConfig::from_toml_str(contents).unwrap();
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.validate_ingestion(),
            Err(CoreError::Config(ConfigError::MissingField { ref field })) if field == "posts_api_url"
        ));

        let without_community = r#"posts_api_url = "https://api.example.com""#;
        let config = AppConfig::from_toml_str(without_community).unwrap();
        assert!(matches!(
            config.validate_ingestion(),
            Err(CoreError::Config(ConfigError::MissingField { ref field })) if field == "community_id"
        ));
    }

    #[test]
    fn test_env_only_load_does_not_need_ingestion() {
        if std::env::var(ENV_POSTS_API_URL).is_ok() || std::env::var(ENV_COMMUNITY_ID).is_ok() {
            return;
        }
        let config = AppConfig::load(None).unwrap();
        assert!(config.posts_api_url.is_empty());
        assert!(config.validate_ingestion().is_err());
    }

    #[test]
    fn test_zero_fetch_limit_rejected() {
        let contents = format!("{}\nfetch_limit = 0\n", MINIMAL);
        let config = AppConfig::from_toml_str(&contents).unwrap();
        let result = config.validate();
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::InvalidValue { ref field, .. })) if field == "fetch_limit"
        ));
    }

    #[test]
    fn test_non_http_url_rejected() {
        let contents = r#"
            posts_api_url = "ftp://example.com"
            community_id = "c"
        "#;
        let config = AppConfig::from_toml_str(contents).unwrap();
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.validate_ingestion(),
            Err(CoreError::Config(ConfigError::ValidationFailed { .. }))
        ));
    }

    #[test]
    fn test_parse_error_surfaces() {
        let result = AppConfig::from_toml_str("community_id = ");
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::Parse(_)))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::from_file(Path::new("/definitely/not/here.toml"));
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::FileNotFound { .. }))
        ));
    }
}
