//! `tracing-subscriber` setup for binaries and jobs embedding the engine.

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::errors::LeadflowError;

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Plain,
    /// One JSON object per event.
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Level for the `leadflow` target when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Include span events and targets.
    pub with_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
            with_targets: true,
        }
    }
}

impl LogConfig {
    /// Default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the fallback level.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Directive used when `RUST_LOG` is unset.
    #[must_use]
    pub fn fallback_directive(&self) -> String {
        format!("leadflow={}", self.level)
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over [`LogConfig::level`].
///
/// # Errors
///
/// Returns [`LeadflowError::Logging`] if a global subscriber is already set.
pub fn init_tracing(config: &LogConfig) -> Result<(), LeadflowError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.fallback_directive()));

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(config.with_targets)
            .boxed(),
        LogFormat::Plain => tracing_subscriber::fmt::layer()
            .with_target(config.with_targets)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| LeadflowError::Logging(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.format, LogFormat::Plain);
        assert_eq!(config.fallback_directive(), "leadflow=info");
        assert_eq!(
            LogConfig::new().with_level("debug").fallback_directive(),
            "leadflow=debug"
        );
    }

    #[test]
    fn test_log_format_serde() {
        let config: LogConfig =
            serde_json::from_str(r#"{"level": "warn", "format": "json", "with_targets": false}"#)
                .unwrap();
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = LogConfig::new().with_format(LogFormat::Json);
        let _ = init_tracing(&config);
        assert!(matches!(
            init_tracing(&config),
            Err(LeadflowError::Logging(_))
        ));
    }
}
