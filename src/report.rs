//! Daily price statistics and the report artifacts derived from the store.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::error::ReportError;
use crate::listing::ListingRecord;
use crate::store::HistoryStore;

pub const REPORT_FILE: &str = "report.md";
pub const CHART_FILE: &str = "price_dynamics.svg";
pub const DAILY_FILE: &str = "price_dynamics.csv";

const CHART_WIDTH: f64 = 1200.0;
const CHART_HEIGHT: f64 = 600.0;
const CHART_MARGIN: f64 = 80.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub generated_on: NaiveDate,
    pub total: usize,
    /// Records first observed on `generated_on`.
    pub new_today: usize,
    /// `None` for an empty store.
    pub prices: Option<PriceSummary>,
    /// One entry per observation date, oldest first.
    pub daily: Vec<DailyStats>,
}

pub fn build_report(records: &[ListingRecord], today: NaiveDate) -> Report {
    let mut by_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for record in records {
        by_day.entry(record.observed_at.date()).or_default().push(record.price);
    }

    let daily: Vec<DailyStats> = by_day
        .into_iter()
        .filter_map(|(date, prices)| {
            summarize(&prices).map(|s| DailyStats {
                date,
                count: prices.len(),
                mean: s.mean,
                min: s.min,
                max: s.max,
            })
        })
        .collect();

    let all_prices: Vec<f64> = records.iter().map(|r| r.price).collect();

    Report {
        generated_on: today,
        total: records.len(),
        new_today: daily
            .iter()
            .find(|d| d.date == today)
            .map_or(0, |d| d.count),
        prices: summarize(&all_prices),
        daily,
    }
}

fn summarize(prices: &[f64]) -> Option<PriceSummary> {
    if prices.is_empty() {
        return None;
    }
    let sum: f64 = prices.iter().sum();
    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Some(PriceSummary {
        mean: sum / prices.len() as f64,
        min,
        max,
    })
}

impl Report {
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## Price monitoring report {}", self.generated_on);
        let _ = writeln!(out, "- **Total listings**: {}", self.total);
        let _ = writeln!(out, "- **New today**: {}", self.new_today);
        match &self.prices {
            Some(p) => {
                let _ = writeln!(out, "- **Mean price**: {:.0} RUB", p.mean);
                let _ = writeln!(out, "- **Min price**: {:.0} RUB", p.min);
                let _ = writeln!(out, "- **Max price**: {:.0} RUB", p.max);
            }
            None => {
                let _ = writeln!(out, "- **Mean price**: n/a");
            }
        }
        out
    }

    /// Line chart of the daily mean price.
    pub fn to_svg(&self) -> String {
        let plot_w = CHART_WIDTH - 2.0 * CHART_MARGIN;
        let plot_h = CHART_HEIGHT - 2.0 * CHART_MARGIN;
        let (low, high) = self.mean_range();

        let points: Vec<(f64, f64, &DailyStats)> = self
            .daily
            .iter()
            .enumerate()
            .map(|(i, day)| {
                let x = if self.daily.len() > 1 {
                    CHART_MARGIN + plot_w * i as f64 / (self.daily.len() - 1) as f64
                } else {
                    CHART_MARGIN + plot_w / 2.0
                };
                let y = CHART_MARGIN + plot_h * (1.0 - (day.mean - low) / (high - low));
                (x, y, day)
            })
            .collect();

        let mut svg = String::new();
        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="sans-serif">"#,
            w = CHART_WIDTH,
            h = CHART_HEIGHT
        );
        let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="40" text-anchor="middle" font-size="20">Mercedes W124 mean price dynamics</text>"#,
            CHART_WIDTH / 2.0
        );
        let _ = writeln!(
            svg,
            r#"<text x="20" y="{y}" transform="rotate(-90 20 {y})" text-anchor="middle" font-size="14">Price (RUB)</text>"#,
            y = CHART_HEIGHT / 2.0
        );

        for step in 0..=4 {
            let fraction = f64::from(step) / 4.0;
            let y = CHART_MARGIN + plot_h * (1.0 - fraction);
            let value = low + (high - low) * fraction;
            let _ = writeln!(
                svg,
                r##"<line x1="{x1}" y1="{y:.1}" x2="{x2}" y2="{y:.1}" stroke="#ddd"/><text x="{tx}" y="{y:.1}" text-anchor="end" font-size="12">{value:.0}</text>"##,
                x1 = CHART_MARGIN,
                x2 = CHART_WIDTH - CHART_MARGIN,
                tx = CHART_MARGIN - 8.0,
            );
        }

        if points.len() > 1 {
            let path: Vec<String> = points.iter().map(|(x, y, _)| format!("{x:.1},{y:.1}")).collect();
            let _ = writeln!(
                svg,
                r##"<polyline fill="none" stroke="#1f77b4" stroke-width="2" points="{}"/>"##,
                path.join(" ")
            );
        }
        for (x, y, day) in &points {
            let _ = writeln!(
                svg,
                r##"<circle cx="{x:.1}" cy="{y:.1}" r="4" fill="#1f77b4"><title>{} mean {:.0} ({} listings)</title></circle>"##,
                day.date, day.mean, day.count
            );
            let label_y = CHART_HEIGHT - CHART_MARGIN + 20.0;
            let _ = writeln!(
                svg,
                r#"<text x="{x:.1}" y="{label_y}" transform="rotate(45 {x:.1} {label_y})" font-size="12">{}</text>"#,
                day.date
            );
        }

        svg.push_str("</svg>\n");
        svg
    }

    /// Vertical axis bounds, padded so a flat series still has height.
    fn mean_range(&self) -> (f64, f64) {
        let low = self.daily.iter().map(|d| d.mean).fold(f64::INFINITY, f64::min);
        let high = self.daily.iter().map(|d| d.mean).fold(f64::NEG_INFINITY, f64::max);
        if !low.is_finite() || !high.is_finite() {
            return (0.0, 1.0);
        }
        if (high - low).abs() < f64::EPSILON {
            let pad = (low.abs() * 0.1).max(1.0);
            return (low - pad, high + pad);
        }
        (low, high)
    }
}

/// Paths of the files written by [`write_artifacts`].
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub report: PathBuf,
    pub chart: PathBuf,
    pub daily: PathBuf,
}

pub fn write_artifacts(report: &Report, dir: &Path) -> Result<Artifacts, ReportError> {
    fs::create_dir_all(dir).map_err(|source| ReportError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let artifacts = Artifacts {
        report: dir.join(REPORT_FILE),
        chart: dir.join(CHART_FILE),
        daily: dir.join(DAILY_FILE),
    };

    write_file(&artifacts.report, &report.to_markdown())?;
    write_file(&artifacts.chart, &report.to_svg())?;

    let csv_error = |source: csv::Error| ReportError::Csv {
        path: artifacts.daily.clone(),
        source,
    };
    let mut writer = csv::Writer::from_path(&artifacts.daily).map_err(csv_error)?;
    for day in &report.daily {
        writer.serialize(day).map_err(csv_error)?;
    }
    writer.flush().map_err(|source| ReportError::Write {
        path: artifacts.daily.clone(),
        source,
    })?;

    Ok(artifacts)
}

fn write_file(path: &Path, contents: &str) -> Result<(), ReportError> {
    fs::write(path, contents).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads the store, builds the report and writes all artifacts.
pub fn generate(store: &HistoryStore, dir: &Path, today: NaiveDate) -> Result<Report, ReportError> {
    let records = store.load()?;
    let report = build_report(&records, today);
    let artifacts = write_artifacts(&report, dir)?;
    info!(
        total = report.total,
        new_today = report.new_today,
        report = %artifacts.report.display(),
        "Report artifacts generated"
    );
    Ok(report)
}
