//! End-to-end collection cycles against a scripted session.

use std::collections::VecDeque;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use carwatch::error::Stage;
use carwatch::{
    run_cycle, Collector, CycleOutcome, HistoryStore, ListingExtractor, PageSession, PipelineError,
    SessionError, SessionProvider,
};
use tempfile::TempDir;

/// Serves one scripted page per opened session.
struct ScriptedProvider {
    pages: Mutex<VecDeque<Result<String, String>>>,
    refuse_open: bool,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    fn new(pages: Vec<Result<String, String>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            refuse_open: false,
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct ScriptedSession {
    page: Result<String, String>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl SessionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open(&self) -> Result<Box<dyn PageSession>, SessionError> {
        if self.refuse_open {
            return Err(SessionError::other(Stage::Open, "chromedriver not reachable"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let page = self
            .pages
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()));
        Ok(Box::new(ScriptedSession {
            page,
            closed: Arc::clone(&self.closed),
        }))
    }
}

#[async_trait]
impl PageSession for ScriptedSession {
    async fn navigate(&mut self, _url: &str) -> Result<(), SessionError> {
        match &self.page {
            Ok(_) => Ok(()),
            Err(message) => Err(SessionError::other(Stage::Navigate, message.clone())),
        }
    }

    async fn page_source(&mut self) -> Result<String, SessionError> {
        self.page
            .clone()
            .map_err(|message| SessionError::other(Stage::Render, message))
    }

    async fn close(self: Box<Self>) -> Result<(), SessionError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn item(href: &str, title: &str, price: &str) -> String {
    format!(
        r#"<div data-marker="item">
             <a itemprop="url" href="{href}"><h3 itemprop="name">{title}</h3></a>
             <span><meta itemprop="price" content="{price}"><span>{price} ₽</span></span>
           </div>"#
    )
}

fn results_page(items: &[String]) -> String {
    format!(
        "<!doctype html><html><head><title>W124</title></head><body><div data-marker=\"catalog-serp\">{}</div></body></html>",
        items.concat()
    )
}

fn collector() -> Collector {
    Collector::new(
        "https://x/search?q=w124",
        Duration::ZERO,
        ListingExtractor::new("https://x").unwrap(),
    )
}

fn store_in(dir: &TempDir) -> HistoryStore {
    HistoryStore::new(dir.path().join("data").join("raw_data.csv"))
}

#[tokio::test]
async fn two_runs_recognize_url_variants_as_duplicates() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let provider = ScriptedProvider::new(vec![
        Ok(results_page(&[item("https://x/1?a=1", "A", "100 000")])),
        Ok(results_page(&[
            item("https://x/1", "A", "100 000"),
            item("https://x/2", "B", "200000"),
        ])),
    ]);
    let collector = collector();

    let first = run_cycle(&collector, &provider, &store).await.unwrap();
    assert_eq!(first, CycleOutcome { collected: 1, new: 1 });

    let after_first = store.load().unwrap();
    assert_eq!(after_first.len(), 1);
    assert_eq!(after_first[0].price, 100_000.0);
    assert_eq!(after_first[0].url, "https://x/1?a=1");
    assert_eq!(after_first[0].canonical_url, "https://x/1");

    let second = run_cycle(&collector, &provider, &store).await.unwrap();
    assert_eq!(second, CycleOutcome { collected: 2, new: 1 });

    let after_second = store.load().unwrap();
    let urls: Vec<&str> = after_second.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(urls, vec!["https://x/1?a=1", "https://x/2"]);
    assert_eq!(after_second[1].title, "B");
    assert_eq!(provider.closed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn repeated_page_leaves_store_bytes_unchanged() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let page = results_page(&[item("/a", "A", "1 000"), item("/b", "B", "2 000")]);
    let provider = ScriptedProvider::new(vec![Ok(page.clone()), Ok(page)]);
    let collector = collector();

    run_cycle(&collector, &provider, &store).await.unwrap();
    let before = fs::read(store.path()).unwrap();

    let outcome = run_cycle(&collector, &provider, &store).await.unwrap();
    assert_eq!(outcome, CycleOutcome { collected: 2, new: 0 });
    assert_eq!(fs::read(store.path()).unwrap(), before);
}

#[tokio::test]
async fn failed_navigation_is_zero_new_and_no_store() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let provider = ScriptedProvider::new(vec![Err("net::ERR_CONNECTION_RESET".to_string())]);

    let outcome = run_cycle(&collector(), &provider, &store).await.unwrap();

    assert_eq!(outcome, CycleOutcome { collected: 0, new: 0 });
    assert!(!store.exists());
    assert_eq!(provider.opened.load(Ordering::SeqCst), 1);
    assert_eq!(provider.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_page_does_not_touch_existing_store() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let provider = ScriptedProvider::new(vec![
        Ok(results_page(&[item("/a", "A", "1")])),
        Ok(results_page(&[])),
    ]);
    let collector = collector();

    run_cycle(&collector, &provider, &store).await.unwrap();
    let before = fs::read(store.path()).unwrap();

    let outcome = run_cycle(&collector, &provider, &store).await.unwrap();
    assert_eq!(outcome.new, 0);
    assert_eq!(fs::read(store.path()).unwrap(), before);
}

#[tokio::test]
async fn acquisition_failure_propagates() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let provider = ScriptedProvider {
        refuse_open: true,
        ..ScriptedProvider::new(Vec::new())
    };

    let result = run_cycle(&collector(), &provider, &store).await;

    assert!(matches!(result, Err(PipelineError::Acquisition(_))));
    assert!(!store.exists());
    assert_eq!(provider.closed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreadable_store_is_a_persistence_failure() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    fs::create_dir_all(store.path().parent().unwrap()).unwrap();
    let corrupt = "timestamp,title,price,url\n2024-05-01 10:00:00,A,,https://x/a\n";
    fs::write(store.path(), corrupt).unwrap();
    let provider = ScriptedProvider::new(vec![Ok(results_page(&[item("/b", "B", "5")]))]);

    let result = run_cycle(&collector(), &provider, &store).await;

    assert!(matches!(result, Err(PipelineError::Persistence(_))));
    assert_eq!(fs::read_to_string(store.path()).unwrap(), corrupt);
}
