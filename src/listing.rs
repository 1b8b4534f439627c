//! The listing record and the price normalization applied to every source.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::canonical::canonicalize;
use crate::error::Rejection;

/// On-disk and on-wire format of `observed_at`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Largest accepted price. Every whole number up to it is exact as `f64`.
pub const MAX_PRICE: u64 = 1 << 53;

/// One observed ad instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingRecord {
    /// When the ad was captured, not when it was posted.
    pub observed_at: NaiveDateTime,
    pub title: String,
    pub price: f64,
    /// Link as it appeared on the page, used for display.
    pub url: String,
    /// Identity key derived from `url`.
    pub canonical_url: String,
}

impl ListingRecord {
    /// Validates raw field values into a record.
    ///
    /// This is the single entry point for both freshly extracted blocks and
    /// rows read back from the store, so both go through the same checks.
    pub fn from_raw(
        observed_at: NaiveDateTime,
        title: &str,
        raw_price: &str,
        url: &str,
    ) -> Result<Self, Rejection> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Rejection::EmptyTitle);
        }
        let price = normalize_price(raw_price).ok_or_else(|| Rejection::InvalidPrice(raw_price.to_string()))?;
        let canonical_url = canonicalize(url).ok_or_else(|| Rejection::NoCanonicalUrl(url.to_string()))?;

        Ok(Self {
            observed_at,
            title: title.to_string(),
            price,
            url: url.to_string(),
            canonical_url,
        })
    }

    pub fn timestamp(&self) -> String {
        self.observed_at.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn to_row(&self) -> ListingRow {
        ListingRow {
            timestamp: self.timestamp(),
            title: self.title.clone(),
            price: self.price,
            url: self.url.clone(),
        }
    }
}

/// Served shape of a record. `canonical_url` is never exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRow {
    pub timestamp: String,
    pub title: String,
    pub price: f64,
    pub url: String,
}

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, Rejection> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .map_err(|_| Rejection::InvalidTimestamp(raw.to_string()))
}

/// Turns a marketplace price string into a number.
///
/// A decimal tail of one or two digits after the last `.` or `,` is dropped;
/// every other non-digit (currency signs, spaces, thousands separators) is
/// removed. Returns `None` when no digits remain or the value exceeds
/// [`MAX_PRICE`].
pub fn normalize_price(raw: &str) -> Option<f64> {
    let core = raw.trim_end_matches(|c: char| !c.is_ascii_digit());
    let integral = strip_decimal_tail(core);
    let digits: String = integral.chars().filter(char::is_ascii_digit).collect();

    let value = digits.parse::<u64>().ok()?;
    (value <= MAX_PRICE).then_some(value as f64)
}

/// Plain decimal text for a normalized price, never exponent notation.
pub fn format_price(price: f64) -> String {
    format!("{price:.1}")
}

fn strip_decimal_tail(value: &str) -> &str {
    let Some(pos) = value.rfind(['.', ',']) else {
        return value;
    };
    let (head, tail) = value.split_at(pos);
    let fraction = tail.trim_start_matches(['.', ',']);

    if (1..=2).contains(&fraction.len()) && fraction.chars().all(|c| c.is_ascii_digit()) {
        head
    } else {
        value
    }
}
