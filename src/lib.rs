//! carwatch: incremental collection of W124 classified listings.
//!
//! A collection cycle opens a browser session, loads one search-results
//! page, extracts listings, and appends the ones whose canonical URL has not
//! been seen before to a CSV history. The history is served read-only over
//! HTTP and summarized into daily price reports.

pub mod canonical;
pub mod config;
pub mod error;
pub mod extractor;
pub mod listing;
pub mod logging;
pub mod pipeline;
pub mod query;
pub mod report;
pub mod server;
pub mod session;
pub mod store;

pub use canonical::canonicalize;
pub use config::Config;
pub use error::{PipelineError, QueryError, Rejection, SessionError, StoreError};
pub use extractor::{Extraction, ListingExtractor, ListingPage};
pub use listing::{normalize_price, ListingRecord, ListingRow};
pub use pipeline::{run_cycle, CycleOutcome};
pub use session::{Collector, PageSession, SessionProvider};
pub use store::{merge, HistoryStore, MergeOutcome};
