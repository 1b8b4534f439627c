//! Append-only history of every distinct listing ever observed.
//!
//! The store is a CSV file with the columns `timestamp,title,price,url`.
//! Identity is the canonical URL, which is recomputed on every load and
//! never written out. Every write replaces the whole file through a
//! temporary sibling and a rename, so a crash mid-write leaves the previous
//! version in place.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::listing::{format_price, parse_timestamp, ListingRecord};

/// Row as read from disk. `price` stays text because older stores hold raw
/// marketplace strings such as `"450 000 ₽"`.
#[derive(Debug, Deserialize)]
struct StoredRow {
    timestamp: String,
    title: String,
    price: String,
    url: String,
}

/// Row as written to disk. The price is plain decimal text so that it
/// normalizes back to the same value on load.
#[derive(Debug, Serialize)]
struct PersistedRow<'a> {
    timestamp: String,
    title: &'a str,
    price: String,
    url: &'a str,
}

impl<'a> From<&'a ListingRecord> for PersistedRow<'a> {
    fn from(record: &'a ListingRecord) -> Self {
        Self {
            timestamp: record.timestamp(),
            title: &record.title,
            price: format_price(record.price),
            url: &record.url,
        }
    }
}

/// Result of merging an incoming batch into the existing history.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// Incoming records whose canonical URL was not seen before, in batch order.
    pub new_records: Vec<ListingRecord>,
    /// Existing records followed by `new_records`.
    pub merged: Vec<ListingRecord>,
}

/// Splits `incoming` into records already known and records to append.
///
/// Existing records are never reordered or dropped. A canonical URL that
/// repeats inside `incoming` is kept only once, first occurrence wins.
pub fn merge(existing: Vec<ListingRecord>, incoming: Vec<ListingRecord>) -> MergeOutcome {
    let mut seen: HashSet<String> = existing.iter().map(|r| r.canonical_url.clone()).collect();

    let new_records: Vec<ListingRecord> = incoming
        .into_iter()
        .filter(|record| seen.insert(record.canonical_url.clone()))
        .collect();

    let mut merged = existing;
    merged.extend(new_records.iter().cloned());

    MergeOutcome { new_records, merged }
}

/// Durable listing history backed by a single CSV file.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Reads the full history in insertion order. A missing file is an
    /// empty history.
    pub fn load(&self) -> Result<Vec<ListingRecord>, StoreError> {
        if !self.exists() {
            debug!(path = %self.path.display(), "Store does not exist yet");
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path).map_err(|source| self.csv_error(source))?;
        let mut records = Vec::new();

        for (index, row) in reader.deserialize::<StoredRow>().enumerate() {
            let row = row.map_err(|source| self.csv_error(source))?;
            // Header is line 1.
            let line = index as u64 + 2;
            let record = parse_timestamp(&row.timestamp)
                .and_then(|observed_at| ListingRecord::from_raw(observed_at, &row.title, &row.price, &row.url))
                .map_err(|reason| StoreError::InvalidRow {
                    path: self.path.clone(),
                    line,
                    reason,
                })?;
            records.push(record);
        }

        Ok(records)
    }

    /// Appends the previously unseen part of `batch` and returns how many
    /// records were added. Nothing is written when that number is zero.
    pub fn append(&self, batch: Vec<ListingRecord>) -> Result<usize, StoreError> {
        if batch.is_empty() {
            warn!("Nothing to save: empty batch");
            return Ok(0);
        }

        if !self.exists() {
            let outcome = merge(Vec::new(), batch);
            self.write_atomic(&outcome.merged)?;
            info!(records = outcome.merged.len(), path = %self.path.display(), "Initial save");
            return Ok(outcome.new_records.len());
        }

        let existing = self.load()?;
        let outcome = merge(existing, batch);

        if outcome.new_records.is_empty() {
            info!(total = outcome.merged.len(), "No new unique listings found");
            return Ok(0);
        }

        self.write_atomic(&outcome.merged)?;
        info!(
            new = outcome.new_records.len(),
            total = outcome.merged.len(),
            "Saved new unique listings"
        );
        Ok(outcome.new_records.len())
    }

    fn write_atomic(&self, records: &[ListingRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(parent, source))?;
        }

        let temp_path = self.temp_path();
        let result = self.write_rows(&temp_path, records).and_then(|()| {
            fs::rename(&temp_path, &self.path).map_err(|source| self.io_error(&self.path, source))
        });

        if result.is_err() {
            // Best effort; the previous store is untouched either way.
            let _ = fs::remove_file(&temp_path);
        }
        result
    }

    fn write_rows(&self, temp_path: &Path, records: &[ListingRecord]) -> Result<(), StoreError> {
        let file = File::create(temp_path).map_err(|source| self.io_error(temp_path, source))?;
        let mut writer = csv::Writer::from_writer(file);

        for record in records {
            writer.serialize(PersistedRow::from(record)).map_err(|source| StoreError::Csv {
                path: temp_path.to_path_buf(),
                source,
            })?;
        }

        let file = writer
            .into_inner()
            .map_err(|e| self.io_error(temp_path, e.into_error()))?;
        file.sync_all().map_err(|source| self.io_error(temp_path, source))
    }

    /// Sibling of the store named `<file name>.tmp`.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv_error(&self, source: csv::Error) -> StoreError {
        StoreError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}
