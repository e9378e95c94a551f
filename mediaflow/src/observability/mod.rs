//! Logging setup.
//!
//! The engine only emits `tracing` events; hosts that do not install a
//! subscriber of their own can call [`init_logging`]. `RUST_LOG` always
//! takes precedence over the configured level.

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for the `mediaflow` target.
    pub level: Level,
    /// Emit JSON lines instead of human-readable output.
    pub use_json: bool,
    /// Include the module target.
    pub include_target: bool,
    /// Include file and line.
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Default configuration at `level`.
    #[must_use]
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// JSON output with source locations.
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
        }
    }

    /// Builds the filter: `RUST_LOG` if set, plus the configured level for
    /// this crate.
    #[must_use]
    pub fn filter(&self) -> EnvFilter {
        let filter = EnvFilter::from_default_env();
        match format!("mediaflow={}", self.level).parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        }
    }
}

/// Parses a level name, falling back to INFO.
#[must_use]
pub fn parse_level(name: &str) -> Level {
    name.parse().unwrap_or(Level::INFO)
}

/// Installs a global subscriber. Only the first call has an effect, and
/// an already-installed subscriber is left in place.
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = config.filter();
        let result = if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location),
                )
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location),
                )
                .try_init()
        };
        if let Err(err) = result {
            tracing::debug!(error = %err, "Subscriber already installed");
        }
    });
}
