//! Logging setup using `tracing` and `tracing-subscriber`
//!
//! Log levels as used across the crate:
//!
//! - `warn`: failed installs, swallowed cache errors, failed update checks
//! - `info`: lifecycle transitions (install, activate, stale cache deletion)
//! - `debug`: fetch decisions and broadcasts
//! - `trace`: everything else from dependencies

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Configuration for log output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Most verbose level emitted by this crate
    pub level: Level,
    /// Whether to use ANSI colors in output
    pub with_ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            with_ansi: true,
        }
    }
}

impl LogConfig {
    /// Maps the count of `-v` flags to a level
    ///
    /// - 0: info
    /// - 1: debug
    /// - 2+: trace
    pub fn from_verbosity(verbosity: u8) -> Self {
        let level = match verbosity {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };
        Self {
            level,
            ..Default::default()
        }
    }

    /// Filter used when `RUST_LOG` is not set
    pub fn default_directive(&self) -> String {
        format!("warn,shellcache={}", self.level.as_str().to_lowercase())
    }
}

/// Installs the global subscriber, writing to stderr
///
/// `RUST_LOG` takes precedence over the configured level. Calling this twice
/// is a no-op for the second call.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.with_ansi)
        .with_target(false)
        .without_time();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_verbosity_levels() {
        assert_eq!(LogConfig::from_verbosity(0).level, Level::INFO);
        assert_eq!(LogConfig::from_verbosity(1).level, Level::DEBUG);
        assert_eq!(LogConfig::from_verbosity(5).level, Level::TRACE);
    }

    #[test]
    fn test_default_directive_scopes_crate_level() {
        assert_eq!(
            LogConfig::from_verbosity(1).default_directive(),
            "warn,shellcache=debug"
        );
    }

    #[test]
    fn test_default_directive_parses_as_filter() {
        for verbosity in 0..3 {
            let directive = LogConfig::from_verbosity(verbosity).default_directive();
            assert!(EnvFilter::try_new(&directive).is_ok(), "{directive}");
        }
    }
}
