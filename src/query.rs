//! Read-only filter/sort view over the history store.

use serde::Deserialize;

use crate::error::QueryError;
use crate::listing::{ListingRecord, ListingRow};
use crate::store::HistoryStore;

pub const MAX_LIMIT: usize = 100;

/// Column results are ordered by, always descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Price,
    Timestamp,
}

impl SortKey {
    fn parse(value: &str) -> Result<Self, QueryError> {
        match value {
            "price" => Ok(Self::Price),
            "timestamp" => Ok(Self::Timestamp),
            other => Err(QueryError::InvalidParameter {
                name: "sort",
                message: format!("expected 'price' or 'timestamp', got '{other}'"),
            }),
        }
    }
}

/// Query string as sent by the client, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSearchParams {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub sort: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub min_price: f64,
    pub max_price: f64,
    pub sort: SortKey,
    pub limit: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            min_price: 0.0,
            max_price: 10_000_000.0,
            sort: SortKey::Price,
            limit: 10,
        }
    }
}

impl TryFrom<RawSearchParams> for SearchParams {
    type Error = QueryError;

    fn try_from(raw: RawSearchParams) -> Result<Self, Self::Error> {
        let defaults = Self::default();
        let min_price = non_negative("min_price", raw.min_price.unwrap_or(defaults.min_price))?;
        let max_price = non_negative("max_price", raw.max_price.unwrap_or(defaults.max_price))?;
        let sort = raw
            .sort
            .as_deref()
            .map(SortKey::parse)
            .transpose()?
            .unwrap_or(defaults.sort);

        let limit = match raw.limit {
            None => defaults.limit,
            Some(limit) if (0..=MAX_LIMIT as i64).contains(&limit) => limit as usize,
            Some(limit) => {
                return Err(QueryError::InvalidParameter {
                    name: "limit",
                    message: format!("must be between 0 and {MAX_LIMIT}, got {limit}"),
                });
            }
        };

        Ok(Self {
            min_price,
            max_price,
            sort,
            limit,
        })
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<f64, QueryError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(QueryError::InvalidParameter {
            name,
            message: format!("must be a non-negative number, got {value}"),
        })
    }
}

/// Keeps records priced within bounds, orders them descending by the sort
/// key and returns the top `limit`. Ties keep store order.
pub fn search(records: &[ListingRecord], params: &SearchParams) -> Vec<ListingRow> {
    let mut matching: Vec<&ListingRecord> = records
        .iter()
        .filter(|r| r.price >= params.min_price && r.price <= params.max_price)
        .collect();

    match params.sort {
        SortKey::Price => matching.sort_by(|a, b| b.price.total_cmp(&a.price)),
        SortKey::Timestamp => matching.sort_by(|a, b| b.observed_at.cmp(&a.observed_at)),
    }

    matching
        .into_iter()
        .take(params.limit)
        .map(ListingRecord::to_row)
        .collect()
}

/// Loads the store and runs [`search`] over it.
pub fn search_store(store: &HistoryStore, params: &SearchParams) -> Result<Vec<ListingRow>, QueryError> {
    if !store.exists() {
        return Err(QueryError::StoreNotFound);
    }
    let records = store.load().map_err(QueryError::Store)?;
    Ok(search(&records, params))
}
