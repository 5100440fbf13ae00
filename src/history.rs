//! Per-run caches of processed products and relayed images.

use crate::amazon::ProductUrl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// What happened to one product link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub image_url: String,
    pub success: bool,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub new: usize,
    pub reused: usize,
    pub unchanged: usize,
}

/// Product link → image URL, keyed so that tracking parameters don't matter.
#[derive(Debug, Default)]
pub struct ProductHistory {
    records: HashMap<String, ProductRecord>,
    stats: HistoryStats,
}

impl ProductHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome. The first record for a product wins and counts
    /// as new, whether or not an image was found.
    pub fn record(&mut self, product: &ProductUrl, image_url: &str, success: bool) -> bool {
        let key = product.cache_key();
        if self.records.contains_key(&key) {
            return false;
        }

        self.stats.new += 1;
        self.records.insert(
            key,
            ProductRecord { image_url: image_url.to_string(), success, recorded_at: Utc::now() },
        );
        true
    }

    /// Returns the image found earlier for this product, if that run succeeded.
    pub fn lookup(&mut self, product: &ProductUrl) -> Option<String> {
        let record = self.records.get(&product.cache_key()).filter(|r| r.success)?;
        self.stats.reused += 1;
        debug!("History hit for {}", product);
        Some(record.image_url.clone())
    }

    pub fn mark_unchanged(&mut self) {
        self.stats.unchanged += 1;
    }

    pub fn stats(&self) -> HistoryStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.stats = HistoryStats::default();
    }
}

/// A relay attempt that did not produce a hosted URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub base: String,
    pub table: String,
    pub row_id: String,
    pub column: String,
    pub row_label: String,
    pub url: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

/// Failures grouped by base, then table.
pub type GroupedFailures = BTreeMap<String, BTreeMap<String, Vec<FailureRecord>>>;

/// Source URL → hosted URL for the current run, plus outstanding failures.
#[derive(Debug, Default)]
pub struct RelayHistory {
    hosted: HashMap<String, String>,
    failures: Vec<FailureRecord>,
    resolved: Vec<FailureRecord>,
}

impl RelayHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hosted_url(&self, source: &str) -> Option<&str> {
        self.hosted.get(source).map(String::as_str)
    }

    /// Stores a hosted URL. Failures for the same source move to the
    /// resolved list so their rows can still be patched.
    pub fn record_success(&mut self, source: &str, hosted: &str) {
        self.hosted.insert(source.to_string(), hosted.to_string());

        let (done, open): (Vec<_>, Vec<_>) = self.failures.drain(..).partition(|f| f.url == source);
        if !done.is_empty() {
            debug!("Resolved {} earlier failure(s) for {}", done.len(), source);
        }
        self.failures = open;
        self.resolved.extend(done);
    }

    pub fn record_failure(&mut self, record: FailureRecord) {
        self.failures.push(record);
    }

    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Earlier failures whose image was relayed later in the run.
    pub fn resolved(&self) -> &[FailureRecord] {
        &self.resolved
    }

    pub fn failures_grouped(&self) -> GroupedFailures {
        group(self.failures.iter())
    }

    /// Failures and resolved records together, grouped for a retry pass.
    pub fn pending_grouped(&self) -> GroupedFailures {
        group(self.failures.iter().chain(self.resolved.iter()))
    }

    pub fn hosted_count(&self) -> usize {
        self.hosted.len()
    }

    pub fn clear(&mut self) {
        info!(
            "Clearing relay history ({} hosted, {} failures)",
            self.hosted.len(),
            self.failures.len()
        );
        self.hosted.clear();
        self.failures.clear();
        self.resolved.clear();
    }
}

fn group<'a>(records: impl Iterator<Item = &'a FailureRecord>) -> GroupedFailures {
    let mut grouped = GroupedFailures::new();
    for record in records {
        grouped
            .entry(record.base.clone())
            .or_default()
            .entry(record.table.clone())
            .or_default()
            .push(record.clone());
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(raw: &str) -> ProductUrl {
        ProductUrl::parse(raw).unwrap()
    }

    fn failure(base: &str, table: &str, url: &str) -> FailureRecord {
        FailureRecord {
            base: base.to_string(),
            table: table.to_string(),
            row_id: format!("{}-{}", table, url.len()),
            column: "Images".to_string(),
            row_label: "Row".to_string(),
            url: url.to_string(),
            error: "timeout".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_product_history_first_record_wins() {
        let mut history = ProductHistory::new();
        let url = product("https://www.amazon.com/dp/B0TEST0001");

        assert!(history.record(&url, "https://m.media-amazon.com/images/I/a.jpg", true));
        assert!(!history.record(&url, "https://m.media-amazon.com/images/I/b.jpg", true));
        assert_eq!(history.len(), 1);
        assert_eq!(history.stats().new, 1);
        assert_eq!(history.lookup(&url).as_deref(), Some("https://m.media-amazon.com/images/I/a.jpg"));
    }

    #[test]
    fn test_product_history_ignores_failures_on_lookup() {
        let mut history = ProductHistory::new();
        let url = product("https://www.amazon.com/dp/B0TEST0002");

        history.record(&url, "", false);
        assert!(history.lookup(&url).is_none());
        assert_eq!(history.stats(), HistoryStats { new: 1, reused: 0, unchanged: 0 });
    }

    #[test]
    fn test_product_history_counts_reuse_and_clears() {
        let mut history = ProductHistory::new();
        let url = product("https://www.amazon.com/dp/B0TEST0003");
        history.record(&url, "https://m.media-amazon.com/images/I/c.jpg", true);

        history.lookup(&url);
        history.lookup(&url);
        history.mark_unchanged();
        assert_eq!(history.stats(), HistoryStats { new: 1, reused: 2, unchanged: 1 });

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.stats(), HistoryStats::default());
    }

    #[test]
    fn test_relay_history_success_resolves_failure() {
        let mut history = RelayHistory::new();
        history.record_failure(failure("Base", "T1", "https://cloud.seatable.cn/a.jpg"));
        history.record_failure(failure("Base", "T1", "https://cloud.seatable.cn/b.jpg"));

        history.record_success("https://cloud.seatable.cn/a.jpg", "https://img.example.com/a.jpg");

        assert_eq!(history.failures().len(), 1);
        assert_eq!(history.failures()[0].url, "https://cloud.seatable.cn/b.jpg");
        assert_eq!(history.resolved().len(), 1);
        assert_eq!(history.hosted_url("https://cloud.seatable.cn/a.jpg"), Some("https://img.example.com/a.jpg"));
        assert_eq!(history.hosted_count(), 1);
    }

    #[test]
    fn test_failures_grouped_by_base_then_table() {
        let mut history = RelayHistory::new();
        history.record_failure(failure("B2", "T1", "u1"));
        history.record_failure(failure("B1", "T2", "u2"));
        history.record_failure(failure("B1", "T1", "u3"));
        history.record_failure(failure("B1", "T1", "u4"));

        let grouped = history.failures_grouped();
        assert_eq!(grouped.keys().collect::<Vec<_>>(), vec!["B1", "B2"]);
        assert_eq!(grouped["B1"]["T1"].len(), 2);
        assert_eq!(grouped["B1"]["T2"].len(), 1);
        assert_eq!(grouped["B2"]["T1"][0].url, "u1");
    }

    #[test]
    fn test_pending_includes_resolved() {
        let mut history = RelayHistory::new();
        history.record_failure(failure("B", "T", "u1"));
        history.record_failure(failure("B", "T", "u2"));
        history.record_success("u1", "h1");

        assert_eq!(history.failures_grouped()["B"]["T"].len(), 1);
        assert_eq!(history.pending_grouped()["B"]["T"].len(), 2);

        history.clear();
        assert!(history.failures().is_empty());
        assert!(history.resolved().is_empty());
        assert!(history.hosted_url("u1").is_none());
    }
}
