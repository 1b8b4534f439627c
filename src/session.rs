//! Browser/network session lifecycle and the collection run built on it.
//!
//! A run moves through `open → navigate → settle → render → close`. Only a
//! failure to open is returned to the caller; anything after that is logged
//! with its stage and turns into an empty result. The session is closed on
//! every path once it has been opened.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, SubsecRound};
use reqwest::header::USER_AGENT;
use thirtyfour::{ChromiumLikeCapabilities, DesiredCapabilities, WebDriver};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::{Backend, CollectorConfig};
use crate::error::{SelectorError, SessionError, Stage};
use crate::extractor::ListingExtractor;
use crate::listing::ListingRecord;

/// An open session that can load one page and hand back its markup.
#[async_trait]
pub trait PageSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// Markup of the currently loaded page, after any rendering.
    async fn page_source(&mut self) -> Result<String, SessionError>;

    /// Releases the session. Called exactly once per opened session.
    async fn close(self: Box<Self>) -> Result<(), SessionError>;
}

/// Acquires sessions.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn open(&self) -> Result<Box<dyn PageSession>, SessionError>;
}

/// Chrome driven through a WebDriver endpoint such as chromedriver.
pub struct WebDriverProvider {
    webdriver_url: String,
    headless: bool,
}

impl WebDriverProvider {
    pub fn new(webdriver_url: impl Into<String>, headless: bool) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            headless,
        }
    }
}

#[async_trait]
impl SessionProvider for WebDriverProvider {
    fn name(&self) -> &str {
        "webdriver"
    }

    async fn open(&self) -> Result<Box<dyn PageSession>, SessionError> {
        let mut caps = DesiredCapabilities::chrome();
        let mut args = vec!["--no-sandbox", "--disable-dev-shm-usage"];
        if self.headless {
            args.insert(0, "--headless");
        }
        for arg in args {
            caps.add_arg(arg)
                .map_err(|e| SessionError::webdriver(Stage::Open, e))?;
        }

        let driver = WebDriver::new(self.webdriver_url.as_str(), caps)
            .await
            .map_err(|e| SessionError::webdriver(Stage::Open, e))?;
        debug!(endpoint = %self.webdriver_url, headless = self.headless, "WebDriver session opened");

        Ok(Box::new(WebDriverSession { driver }))
    }
}

struct WebDriverSession {
    driver: WebDriver,
}

#[async_trait]
impl PageSession for WebDriverSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.driver
            .goto(url)
            .await
            .map_err(|e| SessionError::webdriver(Stage::Navigate, e))
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        self.driver
            .source()
            .await
            .map_err(|e| SessionError::webdriver(Stage::Render, e))
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        self.driver
            .quit()
            .await
            .map_err(|e| SessionError::webdriver(Stage::Close, e))
    }
}

/// Plain HTTP fetch for pages that render server-side.
pub struct HttpProvider {
    client: reqwest::Client,
    user_agent: String,
}

impl HttpProvider {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SessionError::http(Stage::Open, e))?;
        Ok(Self {
            client,
            user_agent: user_agent.into(),
        })
    }
}

#[async_trait]
impl SessionProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn open(&self) -> Result<Box<dyn PageSession>, SessionError> {
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            user_agent: self.user_agent.clone(),
            body: None,
        }))
    }
}

struct HttpSession {
    client: reqwest::Client,
    user_agent: String,
    body: Option<String>,
}

#[async_trait]
impl PageSession for HttpSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent.as_str())
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| SessionError::http(Stage::Navigate, e))?;

        let text = response
            .text()
            .await
            .map_err(|e| SessionError::http(Stage::Render, e))?;
        self.body = Some(text);
        Ok(())
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        self.body
            .clone()
            .ok_or_else(|| SessionError::other(Stage::Render, "no page has been loaded"))
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Builds the provider selected in the config.
pub fn provider_from_config(config: &CollectorConfig) -> Result<Box<dyn SessionProvider>, SessionError> {
    match config.backend {
        Backend::Webdriver => Ok(Box::new(WebDriverProvider::new(
            config.webdriver_url.clone(),
            config.headless,
        ))),
        Backend::Http => Ok(Box::new(HttpProvider::new(
            config.user_agent.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?)),
    }
}

/// Drives one fetch of the target page and extracts its listings.
pub struct Collector {
    target_url: String,
    settle_delay: Duration,
    extractor: ListingExtractor,
}

impl Collector {
    pub fn new(target_url: impl Into<String>, settle_delay: Duration, extractor: ListingExtractor) -> Self {
        Self {
            target_url: target_url.into(),
            settle_delay,
            extractor,
        }
    }

    pub fn from_config(config: &CollectorConfig) -> Result<Self, SelectorError> {
        Ok(Self::new(
            config.target_url.clone(),
            Duration::from_millis(config.settle_delay_ms),
            ListingExtractor::new(config.host.clone())?,
        ))
    }

    /// Runs one collection.
    ///
    /// # Errors
    ///
    /// Only when the session cannot be opened. Later failures are logged and
    /// yield an empty list.
    pub async fn run(&self, provider: &dyn SessionProvider) -> Result<Vec<ListingRecord>, SessionError> {
        info!(backend = provider.name(), "Starting collection session");
        let mut session = provider.open().await?;

        let outcome = self.collect(session.as_mut()).await;

        match session.close().await {
            Ok(()) => info!("Browser session closed"),
            Err(e) => warn!(stage = %e.stage(), error = %e, "Failed to close browser session"),
        }

        match outcome {
            Ok(records) => Ok(records),
            Err(e) => {
                error!(stage = %e.stage(), error = %e, "Collection failed");
                Ok(Vec::new())
            }
        }
    }

    async fn collect(&self, session: &mut dyn PageSession) -> Result<Vec<ListingRecord>, SessionError> {
        session.navigate(&self.target_url).await?;
        debug!(url = %self.target_url, delay_ms = self.settle_delay.as_millis() as u64, "Waiting for page to settle");
        sleep(self.settle_delay).await;

        let html = session.page_source().await?;
        let observed_at = Local::now().naive_local().trunc_subsecs(0);
        Ok(self.extractor.extract_records(&html, observed_at))
    }
}
