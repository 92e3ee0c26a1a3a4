//! Command-line interface parsing for shellcache
//!
//! This module handles parsing of CLI arguments using clap and resolving them,
//! together with the optional config file, into the settings a run uses.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config::{ConfigError, FetchStrategy, WorkerConfig};

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "shellcache.json";

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified strategy name is not recognized
    #[error("Invalid strategy: '{0}'. Valid strategies: network-first, cache-first")]
    InvalidStrategy(String),

    /// The config file could not be used
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No cache directory was given and none could be determined
    #[error("Could not determine a cache directory; pass --cache-dir")]
    NoCacheDir,
}

/// shellcache - offline application-shell cache worker
#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "Versioned offline cache for a single-page app shell")]
#[command(version)]
pub struct Cli {
    /// Worker config file (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the cache buckets
    #[arg(long, global = true, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Override the fetch strategy: network-first or cache-first
    #[arg(long, global = true, value_name = "STRATEGY")]
    pub strategy: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Precache the application shell into the current bucket
    Install,
    /// Delete stale buckets, keeping only the current one
    Activate,
    /// Resolve one request through the worker
    Fetch {
        /// Absolute URL, or a path relative to the origin
        url: String,
        /// Treat the request as a full page load
        #[arg(long)]
        navigate: bool,
        /// HTTP method
        #[arg(long, default_value = "GET")]
        method: String,
    },
    /// List cache buckets and their entry counts
    Buckets,
    /// Print the worker version as JSON
    Version,
    /// Keep a page open and prompt when a new worker version is deployed
    Watch,
}

/// Settings derived from CLI arguments and the config file
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// The worker to run
    pub worker: WorkerConfig,
    /// Config file the worker was loaded from, if any
    pub config_path: Option<PathBuf>,
    /// Explicit strategy from the command line
    pub strategy_override: Option<FetchStrategy>,
    /// Explicit cache directory from the command line or config
    pub cache_dir: Option<PathBuf>,
}

/// Parses a strategy string argument into a FetchStrategy.
///
/// # Returns
/// * `Ok(FetchStrategy)` if the string names a strategy
/// * `Err(CliError::InvalidStrategy)` if it doesn't
pub fn parse_strategy_arg(s: &str) -> Result<FetchStrategy, CliError> {
    s.parse()
        .map_err(|_| CliError::InvalidStrategy(s.to_string()))
}

impl RunConfig {
    /// Creates a RunConfig from parsed CLI arguments.
    ///
    /// The config file is `--config` if given, else `shellcache.json` in
    /// `cwd` if it exists, else the built-in defaults.
    pub fn from_cli(cli: &Cli, cwd: &Path) -> Result<Self, CliError> {
        let strategy_override = cli
            .strategy
            .as_deref()
            .map(parse_strategy_arg)
            .transpose()?;

        let config_path = match &cli.config {
            Some(path) => Some(path.clone()),
            None => {
                let candidate = cwd.join(DEFAULT_CONFIG_FILE);
                candidate.is_file().then_some(candidate)
            }
        };

        let mut worker = match &config_path {
            Some(path) => WorkerConfig::load(path)?,
            None => WorkerConfig::default(),
        };
        if let Some(strategy) = strategy_override {
            worker.strategy = strategy;
        }

        let cache_dir = cli.cache_dir.clone().or_else(|| worker.cache_dir.clone());

        Ok(RunConfig {
            worker,
            config_path,
            strategy_override,
            cache_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_strategy_arg_aliases() {
        assert_eq!(parse_strategy_arg("network-first").unwrap(), FetchStrategy::NetworkFirst);
        assert_eq!(parse_strategy_arg("cache").unwrap(), FetchStrategy::CacheFirst);
    }

    #[test]
    fn test_parse_strategy_arg_invalid() {
        let err = parse_strategy_arg("offline-only").unwrap_err();
        assert!(err.to_string().contains("Invalid strategy"));
        assert!(err.to_string().contains("offline-only"));
    }

    #[test]
    fn test_cli_parse_fetch_command() {
        let cli = Cli::parse_from(["shellcache", "fetch", "./index.html", "--navigate"]);
        assert_eq!(
            cli.command,
            Command::Fetch {
                url: "./index.html".to_string(),
                navigate: true,
                method: "GET".to_string(),
            }
        );
    }

    #[test]
    fn test_cli_parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["shellcache", "buckets", "-vv", "--strategy", "cache-first"]);
        assert_eq!(cli.command, Command::Buckets);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.strategy.as_deref(), Some("cache-first"));
    }

    #[test]
    fn test_run_config_defaults_without_file() {
        let cwd = TempDir::new().unwrap();
        let cli = Cli::parse_from(["shellcache", "version"]);
        let run = RunConfig::from_cli(&cli, cwd.path()).unwrap();
        assert!(run.config_path.is_none());
        assert_eq!(run.worker, WorkerConfig::default());
        assert!(run.cache_dir.is_none());
    }

    #[test]
    fn test_run_config_picks_up_file_in_cwd() {
        let cwd = TempDir::new().unwrap();
        std::fs::write(
            cwd.path().join(DEFAULT_CONFIG_FILE),
            r#"{ "version": "v9", "cache_dir": "/tmp/buckets" }"#,
        )
        .unwrap();
        let cli = Cli::parse_from(["shellcache", "version"]);

        let run = RunConfig::from_cli(&cli, cwd.path()).unwrap();

        assert_eq!(run.worker.version, "v9");
        assert_eq!(run.cache_dir, Some(PathBuf::from("/tmp/buckets")));
    }

    #[test]
    fn test_run_config_flags_override_file() {
        let cwd = TempDir::new().unwrap();
        let path = cwd.path().join("custom.json");
        std::fs::write(&path, r#"{ "strategy": "network-first", "cache_dir": "/a" }"#).unwrap();
        let cli = Cli::parse_from([
            "shellcache",
            "--config",
            path.to_str().unwrap(),
            "--cache-dir",
            "/b",
            "--strategy",
            "cache-first",
            "install",
        ]);

        let run = RunConfig::from_cli(&cli, cwd.path()).unwrap();

        assert_eq!(run.worker.strategy, FetchStrategy::CacheFirst);
        assert_eq!(run.strategy_override, Some(FetchStrategy::CacheFirst));
        assert_eq!(run.cache_dir, Some(PathBuf::from("/b")));
    }

    #[test]
    fn test_run_config_invalid_strategy() {
        let cwd = TempDir::new().unwrap();
        let cli = Cli::parse_from(["shellcache", "--strategy", "nope", "install"]);
        assert!(matches!(
            RunConfig::from_cli(&cli, cwd.path()),
            Err(CliError::InvalidStrategy(_))
        ));
    }

    #[test]
    fn test_run_config_missing_config_file() {
        let cwd = TempDir::new().unwrap();
        let cli = Cli::parse_from(["shellcache", "--config", "/no/such/file.json", "install"]);
        assert!(matches!(
            RunConfig::from_cli(&cli, cwd.path()),
            Err(CliError::Config(_))
        ));
    }
}
