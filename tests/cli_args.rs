//! Integration tests for CLI argument handling
//!
//! Runs the binary against throwaway cache directories. Origins point at a
//! closed local port so nothing here depends on a live server.

use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

/// Origin nothing listens on; connections are refused immediately
const CLOSED_ORIGIN: &str = "http://127.0.0.1:9/";

/// Helper to run the CLI with given args from `cwd` and capture output
fn run_cli_in(cwd: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_shellcache"))
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("Failed to execute shellcache")
}

fn write_config(dir: &TempDir, json: &str) {
    std::fs::write(dir.path().join("shellcache.json"), json).unwrap();
}

#[test]
fn test_help_flag_exits_successfully() {
    let cwd = TempDir::new().unwrap();
    let output = run_cli_in(cwd.path(), &["--help"]);
    assert!(
        output.status.success(),
        "Expected --help to exit successfully"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("shellcache"), "Help should mention shellcache");
    assert!(stdout.contains("install"), "Help should list the install command");
    assert!(stdout.contains("watch"), "Help should list the watch command");
}

#[test]
fn test_invalid_strategy_prints_error_and_exits() {
    let cwd = TempDir::new().unwrap();
    let output = run_cli_in(cwd.path(), &["--strategy", "offline-only", "version"]);
    assert!(!output.status.success(), "Expected invalid strategy to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid strategy"),
        "Should print error message about invalid strategy: {}",
        stderr
    );
}

#[test]
fn test_version_prints_cache_name_json() {
    let cwd = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let output = run_cli_in(
        cwd.path(),
        &["--cache-dir", cache.path().to_str().unwrap(), "version"],
    );
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let info: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(info["version"], "v0.23-cache");
    assert_eq!(info["cacheName"], "deltaf-cache-v0.23-cache");
}

#[test]
fn test_version_reads_config_from_working_directory() {
    let cwd = TempDir::new().unwrap();
    write_config(&cwd, r#"{ "app_name": "demo", "version": "v7" }"#);
    let output = run_cli_in(cwd.path(), &["--cache-dir", ".", "version"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("demo-v7"), "unexpected output: {}", stdout);
}

#[test]
fn test_buckets_on_empty_cache_dir() {
    let cwd = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let output = run_cli_in(
        cwd.path(),
        &["--cache-dir", cache.path().to_str().unwrap(), "buckets"],
    );
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn test_buckets_marks_current_bucket() {
    let cwd = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    std::fs::create_dir(cache.path().join("deltaf-cache-v0.22-cache")).unwrap();
    std::fs::create_dir(cache.path().join("deltaf-cache-v0.23-cache")).unwrap();

    let output = run_cli_in(
        cwd.path(),
        &["--cache-dir", cache.path().to_str().unwrap(), "buckets"],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("  deltaf-cache-v0.22-cache (0 entries)"), "{}", stdout);
    assert!(stdout.contains("* deltaf-cache-v0.23-cache (0 entries)"), "{}", stdout);
}

#[test]
fn test_activate_deletes_stale_buckets() {
    let cwd = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    std::fs::create_dir(cache.path().join("deltaf-cache-v0.22-cache")).unwrap();

    let output = run_cli_in(
        cwd.path(),
        &["--cache-dir", cache.path().to_str().unwrap(), "activate"],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Deleted deltaf-cache-v0.22-cache"), "{}", stdout);
    assert!(!cache.path().join("deltaf-cache-v0.22-cache").exists());
}

#[test]
fn test_install_fails_when_origin_unreachable() {
    let cwd = TempDir::new().unwrap();
    write_config(&cwd, &format!(r#"{{ "origin": "{CLOSED_ORIGIN}" }}"#));
    let cache = TempDir::new().unwrap();

    let output = run_cli_in(
        cwd.path(),
        &["--cache-dir", cache.path().to_str().unwrap(), "install"],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error"), "{}", stderr);
    // No half-filled bucket is left behind
    assert!(std::fs::read_dir(cache.path()).unwrap().next().is_none());
}

#[test]
fn test_fetch_offline_without_cache_is_unavailable() {
    let cwd = TempDir::new().unwrap();
    write_config(&cwd, &format!(r#"{{ "origin": "{CLOSED_ORIGIN}" }}"#));
    let cache = TempDir::new().unwrap();

    let output = run_cli_in(
        cwd.path(),
        &["--cache-dir", cache.path().to_str().unwrap(), "fetch", "./data.json"],
    );
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("503"), "{}", stdout);
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use shellcache::cli::{parse_strategy_arg, Cli, Command, RunConfig};
    use shellcache::config::FetchStrategy;
    use tempfile::TempDir;

    #[test]
    fn test_cli_no_flags() {
        let cli = Cli::parse_from(["shellcache", "install"]);
        assert!(cli.config.is_none());
        assert!(cli.cache_dir.is_none());
        assert!(cli.strategy.is_none());
        assert_eq!(cli.verbose, 0);
        assert_eq!(cli.command, Command::Install);
    }

    #[test]
    fn test_cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["shellcache"]).is_err());
    }

    #[test]
    fn test_cli_fetch_with_method() {
        let cli = Cli::parse_from(["shellcache", "fetch", "/api", "--method", "POST"]);
        assert_eq!(
            cli.command,
            Command::Fetch {
                url: "/api".to_string(),
                navigate: false,
                method: "POST".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_strategy_arg_cache_first() {
        assert_eq!(
            parse_strategy_arg("cache-first").unwrap(),
            FetchStrategy::CacheFirst
        );
    }

    #[test]
    fn test_run_config_strategy_flag() {
        let cwd = TempDir::new().unwrap();
        let cli = Cli::parse_from(["shellcache", "--strategy", "cache", "watch"]);
        let run = RunConfig::from_cli(&cli, cwd.path()).unwrap();
        assert_eq!(run.worker.strategy, FetchStrategy::CacheFirst);
    }
}
