//! Process-wide log subscriber, installed once at startup.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise each `-v` raises the configured level
/// by one step. Fails if a global subscriber is already installed.
pub fn init(config: &LoggingConfig, verbose: u8) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(effective_level(config, verbose)),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))
}

fn effective_level(config: &LoggingConfig, verbose: u8) -> &'static str {
    const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    let base = LEVELS
        .iter()
        .position(|level| *level == config.level.as_str())
        .unwrap_or(2);
    LEVELS[(base + verbose as usize).min(LEVELS.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn verbosity_raises_level_and_saturates() {
        let config = LoggingConfig {
            format: LogFormat::Text,
            level: LogLevel::Warn,
        };
        assert_eq!(effective_level(&config, 0), "warn");
        assert_eq!(effective_level(&config, 1), "info");
        assert_eq!(effective_level(&config, 9), "trace");
    }
}
