//! Structured logging setup.
//!
//! `RUST_LOG` takes precedence over [`TelemetryConfig::log_level`].

use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format of log records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per record.
    #[default]
    Json,
    /// Human readable, multi-line output.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}

impl TelemetryConfig {
    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the fallback filter directive.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Builds the filter: `RUST_LOG` if set and valid, otherwise
    /// `log_level`.
    pub fn env_filter(&self) -> anyhow::Result<EnvFilter> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(&self.log_level)?),
        }
    }
}

/// Installs the global tracing subscriber.
///
/// Fails if the filter directive is invalid or a subscriber is already
/// installed.
pub fn init_tracing(config: &TelemetryConfig) -> anyhow::Result<()> {
    let env_filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true);
            registry.with(fmt_layer).try_init()?;
        }
        LogFormat::Pretty => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: TelemetryConfig = serde_json::from_str(r#"{"format": "pretty"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_builders() {
        let config = TelemetryConfig::default()
            .with_format(LogFormat::Pretty)
            .with_log_level("notifications_connector=debug");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.log_level, "notifications_connector=debug");
    }

    #[test]
    fn test_second_init_fails() {
        let config = TelemetryConfig::default().with_log_level("warn");
        let first = init_tracing(&config);
        let second = init_tracing(&config);
        // Another test binary thread may have installed one first
        assert!(first.is_err() || second.is_err());
    }
}
