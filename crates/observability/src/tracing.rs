//! Tracing/logging initialization.

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// `log` section of the application config.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directives. When unset, `RUST_LOG` is used, then `info`.
    pub filter: Option<String>,
    /// JSON lines when true, human-readable otherwise.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: None,
            json: true,
        }
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(config: &LogConfig) {
    let filter = build_filter(config);

    if config.json {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    match config.filter.as_deref() {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_json_without_filter() {
        let config: LogConfig = serde_json::from_str("{}").unwrap();
        assert!(config.json);
        assert!(config.filter.is_none());
    }

    #[test]
    fn configured_filter_is_used() {
        let config = LogConfig {
            filter: Some("flowforge_api=debug".to_string()),
            json: false,
        };
        assert_eq!(build_filter(&config).to_string(), "flowforge_api=debug");
    }

    #[test]
    fn invalid_filter_falls_back_to_info() {
        let config = LogConfig {
            filter: Some("flowforge=notalevel".to_string()),
            json: true,
        };
        assert_eq!(build_filter(&config).to_string(), "info");
    }

    #[test]
    fn init_twice_is_harmless() {
        let config = LogConfig::default();
        init(&config);
        init(&config);
    }
}
