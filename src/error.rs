//! Error types for every stage of a collection cycle and for the read path.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Why a single listing block or stored row was not turned into a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("listing link is missing")]
    MissingUrl,
    #[error("listing title is missing")]
    MissingTitle,
    #[error("listing title is empty")]
    EmptyTitle,
    #[error("listing price metadata is missing")]
    MissingPrice,
    #[error("price {0:?} has no digits")]
    InvalidPrice(String),
    #[error("url {0:?} has no canonical form")]
    NoCanonicalUrl(String),
    #[error("timestamp {0:?} is not in the expected format")]
    InvalidTimestamp(String),
}

/// A built-in listing selector failed to compile.
#[derive(Debug, Error)]
#[error("invalid selector {selector}: {message}")]
pub struct SelectorError {
    pub selector: &'static str,
    pub message: String,
}

/// Point in the session lifecycle where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Open,
    Navigate,
    Render,
    Close,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Navigate => "navigate",
            Self::Render => "render",
            Self::Close => "close",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures of the browser/network session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("webdriver error during {stage}: {source}")]
    WebDriver {
        stage: Stage,
        #[source]
        source: Box<thirtyfour::error::WebDriverError>,
    },
    #[error("http error during {stage}: {source}")]
    Http {
        stage: Stage,
        #[source]
        source: reqwest::Error,
    },
    #[error("{stage} failed: {message}")]
    Other { stage: Stage, message: String },
}

impl SessionError {
    pub fn webdriver(stage: Stage, source: thirtyfour::error::WebDriverError) -> Self {
        Self::WebDriver {
            stage,
            source: Box::new(source),
        }
    }

    pub fn http(stage: Stage, source: reqwest::Error) -> Self {
        Self::Http { stage, source }
    }

    pub fn other(stage: Stage, message: impl Into<String>) -> Self {
        Self::Other {
            stage,
            message: message.into(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::WebDriver { stage, .. } | Self::Http { stage, .. } | Self::Other { stage, .. } => {
                *stage
            }
        }
    }
}

/// Failures reading or writing the history store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("store csv error at {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid row {line} in {path}: {reason}")]
    InvalidRow {
        path: PathBuf,
        line: u64,
        reason: Rejection,
    },
}

/// Failures of a whole collection cycle that the caller has to act on.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not acquire a browser session: {0}")]
    Acquisition(#[source] SessionError),
    #[error("could not persist collected listings: {0}")]
    Persistence(#[source] StoreError),
}

/// Read-path failures, surfaced to clients as structured errors.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },
    #[error("no listings have been collected yet")]
    StoreNotFound,
    #[error("listing store is unreadable: {0}")]
    Store(#[source] StoreError),
}

impl QueryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::StoreNotFound => "STORE_NOT_FOUND",
            Self::Store(_) => "STORE_UNREADABLE",
        }
    }
}

/// Failures generating report artifacts.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not write {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
