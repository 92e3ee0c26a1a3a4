//! Worker and notifier configuration
//!
//! A [`WorkerConfig`] is the immutable description of one deployed worker
//! version: which bucket it owns, which assets it precaches and which fetch
//! strategy it applies. It is read from a JSON file or built from defaults
//! and never changes while the worker runs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default application prefix of bucket names
pub const DEFAULT_APP_NAME: &str = "deltaf-cache";

/// Default deployment version tag
pub const DEFAULT_VERSION: &str = "v0.23-cache";

/// Default origin the controlled pages are served from
pub const DEFAULT_ORIGIN: &str = "http://localhost:8080/";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for a worker config
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The origin is not an absolute URL
    #[error("Invalid origin '{0}'")]
    InvalidOrigin(String),

    /// A precache or fallback path cannot be resolved against the origin
    #[error("Invalid asset path '{0}'")]
    InvalidAsset(String),

    /// The version tag is empty
    #[error("Version tag must not be empty")]
    EmptyVersion,

    /// The strategy name is not recognized
    #[error("Invalid strategy: '{0}'. Valid strategies: network-first, cache-first")]
    InvalidStrategy(String),
}

/// How intercepted same-origin GET requests are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStrategy {
    /// Network, falling back to the bucket, then to the shell for navigations, then 503
    #[default]
    NetworkFirst,
    /// Bucket with background refresh, falling back to network, then to the shell
    CacheFirst,
}

impl FromStr for FetchStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "network-first" | "network" => Ok(FetchStrategy::NetworkFirst),
            "cache-first" | "cache" => Ok(FetchStrategy::CacheFirst),
            _ => Err(ConfigError::InvalidStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchStrategy::NetworkFirst => write!(f, "network-first"),
            FetchStrategy::CacheFirst => write!(f, "cache-first"),
        }
    }
}

/// Immutable configuration of one deployed worker version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Prefix of the bucket name
    pub app_name: String,
    /// Deployment version tag
    pub version: String,
    /// Origin of the controlled pages; relative paths resolve against it
    pub origin: String,
    /// Application shell, populated at install time
    pub precache: Vec<String>,
    /// Shell document served to navigations that cannot be answered otherwise
    pub navigation_fallback: String,
    /// Fetch strategy for this deployment
    pub strategy: FetchStrategy,
    /// Activate as soon as install completes instead of waiting
    pub skip_waiting_on_install: bool,
    /// Root of on-disk buckets; XDG cache directory when unset
    pub cache_dir: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            version: DEFAULT_VERSION.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            precache: vec![
                "./".to_string(),
                "./index.html".to_string(),
                "./manifest.json".to_string(),
            ],
            navigation_fallback: "./index.html".to_string(),
            strategy: FetchStrategy::default(),
            skip_waiting_on_install: true,
            cache_dir: None,
        }
    }
}

impl WorkerConfig {
    /// Loads and validates a config from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parses and validates a config from JSON text
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: WorkerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_strategy(mut self, strategy: FetchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Checks that every URL in the config resolves
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::EmptyVersion);
        }
        self.precache_urls()?;
        self.fallback_url()?;
        Ok(())
    }

    /// Name of the bucket owned by this version
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.app_name, self.version)
    }

    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.origin)
            .map_err(|_| ConfigError::InvalidOrigin(self.origin.clone()))?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidOrigin(self.origin.clone()));
        }
        Ok(url)
    }

    /// Resolves a path relative to the origin
    pub fn resolve(&self, path: &str) -> Result<Url, ConfigError> {
        self.origin_url()?
            .join(path)
            .map_err(|_| ConfigError::InvalidAsset(path.to_string()))
    }

    /// Absolute URLs of the precached assets, in order
    pub fn precache_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.precache.iter().map(|path| self.resolve(path)).collect()
    }

    /// Absolute URL of the shell document
    pub fn fallback_url(&self) -> Result<Url, ConfigError> {
        self.resolve(&self.navigation_fallback)
    }
}

/// Timing of the update notifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierConfig {
    /// How often to check for a newer worker
    pub poll_interval: Duration,
    /// How long a prompt stays up without interaction
    pub prompt_timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            prompt_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.cache_name(), "deltaf-cache-v0.23-cache");
        assert_eq!(config.precache.len(), 3);
        assert_eq!(config.strategy, FetchStrategy::NetworkFirst);
        assert!(config.skip_waiting_on_install);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_precache_urls_resolve_against_origin() {
        let config = WorkerConfig::default().with_origin("https://app.example.com/deltaf/");
        let urls: Vec<String> = config
            .precache_urls()
            .unwrap()
            .into_iter()
            .map(|u| u.to_string())
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://app.example.com/deltaf/",
                "https://app.example.com/deltaf/index.html",
                "https://app.example.com/deltaf/manifest.json",
            ]
        );
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = WorkerConfig::from_json(r#"{ "version": "v2", "strategy": "cache-first" }"#)
            .unwrap();
        assert_eq!(config.version, "v2");
        assert_eq!(config.strategy, FetchStrategy::CacheFirst);
        assert_eq!(config.app_name, DEFAULT_APP_NAME);
        assert_eq!(config.cache_name(), "deltaf-cache-v2");
    }

    #[test]
    fn test_from_json_rejects_bad_origin() {
        let result = WorkerConfig::from_json(r#"{ "origin": "not a url" }"#);
        assert!(matches!(result, Err(ConfigError::InvalidOrigin(_))));
    }

    #[test]
    fn test_from_json_rejects_empty_version() {
        let result = WorkerConfig::from_json(r#"{ "version": "  " }"#);
        assert!(matches!(result, Err(ConfigError::EmptyVersion)));
    }

    #[test]
    fn test_from_json_rejects_unknown_strategy() {
        let result = WorkerConfig::from_json(r#"{ "strategy": "cache-only" }"#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_reads_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shellcache.json");
        std::fs::write(&path, r#"{ "app_name": "demo", "version": "v7" }"#).unwrap();

        let config = WorkerConfig::load(&path).unwrap();
        assert_eq!(config.cache_name(), "demo-v7");
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = WorkerConfig::load(&temp_dir.path().join("missing.json"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_strategy_from_str_and_display() {
        assert_eq!("cache-first".parse::<FetchStrategy>().unwrap(), FetchStrategy::CacheFirst);
        assert_eq!("Network".parse::<FetchStrategy>().unwrap(), FetchStrategy::NetworkFirst);
        assert!("offline".parse::<FetchStrategy>().is_err());
        assert_eq!(FetchStrategy::CacheFirst.to_string(), "cache-first");
    }

    #[test]
    fn test_notifier_config_default() {
        let config = NotifierConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.prompt_timeout, Duration::from_secs(30));
    }
}
