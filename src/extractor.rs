//! Listing extraction from a rendered search-results page.

use chrono::NaiveDateTime;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::error::{Rejection, SelectorError};
use crate::listing::ListingRecord;

/// Blocks carrying this marker are individual listings.
const ITEM_SELECTOR: &str = r#"div[data-marker="item"]"#;
const URL_SELECTOR: &str = r#"a[itemprop="url"]"#;
const TITLE_SELECTOR: &str = r#"h3[itemprop="name"]"#;
const PRICE_SELECTOR: &str = r#"meta[itemprop="price"]"#;

/// A parsed results page. Extraction borrows from it, so re-extracting
/// means parsing the page again.
pub struct ListingPage {
    document: Html,
}

impl ListingPage {
    pub fn parse(html: &str) -> Self {
        Self {
            document: Html::parse_document(html),
        }
    }
}

/// Outcome for one listing block.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Valid(ListingRecord),
    Rejected { index: usize, reason: Rejection },
}

struct Selectors {
    item: Selector,
    url: Selector,
    title: Selector,
    price: Selector,
}

impl Selectors {
    fn new() -> Result<Self, SelectorError> {
        Ok(Self {
            item: parse_selector(ITEM_SELECTOR)?,
            url: parse_selector(URL_SELECTOR)?,
            title: parse_selector(TITLE_SELECTOR)?,
            price: parse_selector(PRICE_SELECTOR)?,
        })
    }
}

fn parse_selector(selector: &'static str) -> Result<Selector, SelectorError> {
    Selector::parse(selector).map_err(|e| SelectorError {
        selector,
        message: format!("{e:?}"),
    })
}

/// Pulls listing records out of results pages.
pub struct ListingExtractor {
    host: String,
    selectors: Selectors,
}

impl ListingExtractor {
    /// `host` is prefixed to relative listing links, e.g. `https://www.avito.ru`.
    pub fn new(host: impl Into<String>) -> Result<Self, SelectorError> {
        Ok(Self {
            host: host.into().trim_end_matches('/').to_string(),
            selectors: Selectors::new()?,
        })
    }

    /// Yields one result per listing block in document order.
    pub fn extract<'a>(
        &'a self,
        page: &'a ListingPage,
        observed_at: NaiveDateTime,
    ) -> impl Iterator<Item = Extraction> + 'a {
        page.document
            .select(&self.selectors.item)
            .enumerate()
            .map(move |(index, block)| match self.extract_block(block, observed_at) {
                Ok(record) => Extraction::Valid(record),
                Err(reason) => Extraction::Rejected { index, reason },
            })
    }

    /// Parses `html` and keeps the valid records, logging every rejected block.
    pub fn extract_records(&self, html: &str, observed_at: NaiveDateTime) -> Vec<ListingRecord> {
        let page = ListingPage::parse(html);
        let mut records = Vec::new();
        let mut rejected = 0usize;

        for extraction in self.extract(&page, observed_at) {
            match extraction {
                Extraction::Valid(record) => records.push(record),
                Extraction::Rejected { index, reason } => {
                    rejected += 1;
                    warn!(block = index, %reason, "Failed to parse listing block");
                }
            }
        }

        info!(valid = records.len(), rejected, "Extracted listings from page");
        records
    }

    fn extract_block(
        &self,
        block: ElementRef<'_>,
        observed_at: NaiveDateTime,
    ) -> Result<ListingRecord, Rejection> {
        let href = block
            .select(&self.selectors.url)
            .next()
            .and_then(|link| link.value().attr("href"))
            .ok_or(Rejection::MissingUrl)?;

        let title = block
            .select(&self.selectors.title)
            .next()
            .map(|heading| collapse_whitespace(heading.text()))
            .ok_or(Rejection::MissingTitle)?;

        let raw_price = block
            .select(&self.selectors.price)
            .next()
            .and_then(|meta| meta.value().attr("content"))
            .ok_or(Rejection::MissingPrice)?;

        let url = self.absolute_url(href);
        debug!(%url, %title, raw_price, "Parsed listing block");

        ListingRecord::from_raw(observed_at, &title, raw_price, &url)
    }

    fn absolute_url(&self, href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else if href.starts_with("//") {
            format!("https:{}", href)
        } else if href.starts_with('/') {
            format!("{}{}", self.host, href)
        } else {
            format!("{}/{}", self.host, href)
        }
    }
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let text: String = parts.collect::<Vec<_>>().join(" ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const HOST: &str = "https://www.avito.ru";

    fn observed() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    fn block(href: Option<&str>, title: Option<&str>, price: Option<&str>) -> String {
        let link = href
            .map(|h| format!(r#"<a itemprop="url" href="{h}">open</a>"#))
            .unwrap_or_default();
        let heading = title
            .map(|t| format!(r#"<h3 itemprop="name">{t}</h3>"#))
            .unwrap_or_default();
        let meta = price
            .map(|p| format!(r#"<meta itemprop="price" content="{p}">"#))
            .unwrap_or_default();
        format!(r#"<div data-marker="item">{link}{heading}<p>{meta}</p></div>"#)
    }

    fn page(blocks: &[String]) -> String {
        format!(
            r#"<html><body><div data-marker="catalog-serp">{}</div></body></html>"#,
            blocks.concat()
        )
    }

    fn extractor() -> ListingExtractor {
        ListingExtractor::new(HOST).unwrap()
    }

    #[test]
    fn extracts_fields_from_structured_markup() {
        let html = page(&[block(
            Some("/moskva/avtomobili/mercedes-benz_w124_1993_123?context=xyz"),
            Some("Mercedes-Benz W124,\n   1993"),
            Some("450000"),
        )]);

        let records = extractor().extract_records(&html, observed());
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(
            record.url,
            "https://www.avito.ru/moskva/avtomobili/mercedes-benz_w124_1993_123?context=xyz"
        );
        assert_eq!(
            record.canonical_url,
            "https://www.avito.ru/moskva/avtomobili/mercedes-benz_w124_1993_123"
        );
        assert_eq!(record.title, "Mercedes-Benz W124, 1993");
        assert_eq!(record.price, 450_000.0);
        assert_eq!(record.observed_at, observed());
    }

    #[test]
    fn malformed_block_does_not_stop_extraction() {
        let blocks: Vec<String> = (1..=5)
            .map(|i| {
                let href = format!("/ad/{i}");
                let title = format!("W124 #{i}");
                let price = if i == 3 { None } else { Some("100 000") };
                block(Some(&href), Some(&title), price)
            })
            .collect();
        let html = page(&blocks);
        let extractor = extractor();
        let listing_page = ListingPage::parse(&html);

        let results: Vec<Extraction> = extractor.extract(&listing_page, observed()).collect();
        assert_eq!(results.len(), 5);
        assert_eq!(
            results[2],
            Extraction::Rejected {
                index: 2,
                reason: Rejection::MissingPrice
            }
        );

        let records = extractor.extract_records(&html, observed());
        assert_eq!(records.len(), 4);
        let urls: Vec<&str> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.avito.ru/ad/1",
                "https://www.avito.ru/ad/2",
                "https://www.avito.ru/ad/4",
                "https://www.avito.ru/ad/5",
            ]
        );
    }

    #[test]
    fn each_missing_field_has_its_own_reason() {
        let html = page(&[
            block(None, Some("A"), Some("1")),
            block(Some("/a"), None, Some("1")),
            block(Some("/a"), Some("A"), Some("по запросу")),
            block(Some("/a"), Some("   "), Some("1")),
        ]);
        let extractor = extractor();
        let listing_page = ListingPage::parse(&html);
        let reasons: Vec<Rejection> = extractor
            .extract(&listing_page, observed())
            .filter_map(|e| match e {
                Extraction::Rejected { reason, .. } => Some(reason),
                Extraction::Valid(_) => None,
            })
            .collect();

        assert_eq!(
            reasons,
            vec![
                Rejection::MissingUrl,
                Rejection::MissingTitle,
                Rejection::InvalidPrice("по запросу".to_string()),
                Rejection::EmptyTitle,
            ]
        );
    }

    #[test]
    fn blocks_without_marker_are_ignored() {
        let html = r#"<html><body>
            <div data-marker="banner"><a itemprop="url" href="/promo">x</a></div>
            <div><h3 itemprop="name">Not a listing</h3></div>
        </body></html>"#;
        assert!(extractor().extract_records(html, observed()).is_empty());
    }

    #[test]
    fn absolute_and_protocol_relative_links() {
        let extractor = extractor();
        assert_eq!(extractor.absolute_url("https://m.avito.ru/a"), "https://m.avito.ru/a");
        assert_eq!(extractor.absolute_url("//www.avito.ru/a"), "https://www.avito.ru/a");
        assert_eq!(extractor.absolute_url("/a"), "https://www.avito.ru/a");
        assert_eq!(extractor.absolute_url("a"), "https://www.avito.ru/a");
    }
}
