//! Configuration for carwatch
//!
//! Loaded from a TOML file. Every section and field has a default, so an
//! absent file or a partial one is fine.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Search results for Mercedes-Benz W124, all regions, filters baked in.
pub const DEFAULT_TARGET_URL: &str = "https://www.avito.ru/all/avtomobili/mercedes-benz-ASgBAgICAUTgtg3omCg?cd=1&f=ASgBAQICAUTgtg3omCgDQOK2DTSMtCjypCjupCjqtg009oAppIEp1IAppv8RNOiHiwP6h4sD7oeLAw";

pub const DEFAULT_HOST: &str = "https://www.avito.ru";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How pages are fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Chrome driven over WebDriver, renders JavaScript
    Webdriver,
    /// Plain HTTP GET
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Search results page to collect
    pub target_url: String,
    /// Prefix for relative listing links
    pub host: String,
    pub backend: Backend,
    /// WebDriver endpoint (chromedriver)
    pub webdriver_url: String,
    pub headless: bool,
    /// Fixed wait after navigation before the page is read
    pub settle_delay_ms: u64,
    pub user_agent: String,
    /// HTTP backend only
    pub request_timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.to_string(),
            host: DEFAULT_HOST.to_string(),
            backend: Backend::Webdriver,
            webdriver_url: "http://localhost:9515".to_string(),
            headless: true,
            settle_delay_ms: 3000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/raw_data.csv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub artifacts_dir: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Log severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: LogLevel::Info,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        Self::from_toml(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all fields, reporting every problem at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if !self.collector.target_url.starts_with("http") {
            errors.push(format!(
                "collector.target_url must be an http(s) URL, got '{}'",
                self.collector.target_url
            ));
        }
        if !self.collector.host.starts_with("http") {
            errors.push(format!(
                "collector.host must be an http(s) URL, got '{}'",
                self.collector.host
            ));
        }
        if self.collector.backend == Backend::Webdriver && self.collector.webdriver_url.is_empty() {
            errors.push("collector.webdriver_url is required for the webdriver backend".to_string());
        }
        if self.collector.request_timeout_secs == 0 {
            errors.push("collector.request_timeout_secs must be positive".to_string());
        }
        if self.store.path.as_os_str().is_empty() {
            errors.push("store.path must not be empty".to_string());
        }
        if self.server.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "server.listen_addr must be host:port, got '{}'",
                self.server.listen_addr
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("{}", errors.join("; ")))
        }
    }
}
