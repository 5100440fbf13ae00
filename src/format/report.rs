//! Run reports produced by the workflows.

use crate::amazon::{ExtractedImage, Site};
use crate::filters::SkipReason;
use crate::history::FailureRecord;
use crate::table::Table;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Updated,
    Unchanged,
    EmptyLink,
    KeptOriginal,
    Failed,
}

impl std::fmt::Display for RowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowStatus::Updated => write!(f, "updated"),
            RowStatus::Unchanged => write!(f, "unchanged"),
            RowStatus::EmptyLink => write!(f, "empty link"),
            RowStatus::KeptOriginal => write!(f, "kept original"),
            RowStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What happened to one row during `fetch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowOutcome {
    pub row_id: String,
    pub row_label: String,
    pub status: RowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RowOutcome {
    pub fn new(row_id: impl Into<String>, row_label: impl Into<String>, status: RowStatus) -> Self {
        Self { row_id: row_id.into(), row_label: row_label.into(), status, image_url: None, message: None }
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchReport {
    pub table: String,
    pub total_rows: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub empty_links: usize,
    pub kept_original: usize,
    pub failed: usize,
    /// Rows served from the per-run product history
    pub reused: usize,
    /// Products looked up for the first time
    pub new: usize,
    pub duration_secs: f64,
    pub rows: Vec<RowOutcome>,
}

impl FetchReport {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into(), ..Self::default() }
    }

    pub fn record(&mut self, outcome: RowOutcome) {
        match outcome.status {
            RowStatus::Updated => self.updated += 1,
            RowStatus::Unchanged => self.unchanged += 1,
            RowStatus::EmptyLink => self.empty_links += 1,
            RowStatus::KeptOriginal => self.kept_original += 1,
            RowStatus::Failed => self.failed += 1,
        }
        self.rows.push(outcome);
    }

    pub fn processed(&self) -> usize {
        self.rows.len()
    }
}

/// Counters for one table (or, summed, for a whole run).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStats {
    #[serde(default)]
    pub total_rows: usize,
    #[serde(default)]
    pub processed_rows: usize,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub images: usize,
    #[serde(default)]
    pub success: usize,
    #[serde(default)]
    pub failure: usize,
    #[serde(default)]
    pub skipped: usize,
    #[serde(default)]
    pub ignored_domain: usize,
    #[serde(default)]
    pub reused: usize,
    #[serde(default)]
    pub updated_rows: usize,
}

impl TableStats {
    pub fn add_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::IgnoredDomain => self.ignored_domain += 1,
            _ => self.skipped += 1,
        }
    }

    /// Adds another table's counters. Columns are not merged.
    pub fn merge(&mut self, other: &TableStats) {
        self.total_rows += other.total_rows;
        self.processed_rows += other.processed_rows;
        self.images += other.images;
        self.success += other.success;
        self.failure += other.failure;
        self.skipped += other.skipped;
        self.ignored_domain += other.ignored_domain;
        self.reused += other.reused;
        self.updated_rows += other.updated_rows;
    }

    pub fn success_rate(&self) -> f64 {
        let attempted = self.success + self.failure;
        if attempted == 0 {
            0.0
        } else {
            self.success as f64 * 100.0 / attempted as f64
        }
    }
}

/// An image moved to the image host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessRecord {
    pub base: String,
    pub table: String,
    pub row_id: String,
    pub column: String,
    pub row_label: String,
    pub source: String,
    pub hosted: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
    pub name: String,
    pub stats: TableStats,
    pub successes: Vec<SuccessRecord>,
    pub failures: Vec<FailureRecord>,
    /// Set when reading rows stopped early; the stats cover the rows seen so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseReport {
    pub name: String,
    pub tables: Vec<TableReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BaseReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn totals(&self) -> TableStats {
        let mut totals = TableStats::default();
        for table in &self.tables {
            totals.merge(&table.stats);
        }
        totals
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySummary {
    pub attempted: usize,
    pub success: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayReport {
    pub bases: Vec<BaseReport>,
    pub retry: RetrySummary,
    /// Failures still open after the retry pass
    pub outstanding: Vec<FailureRecord>,
    pub duration_secs: f64,
}

impl RelayReport {
    pub fn totals(&self) -> TableStats {
        let mut totals = TableStats::default();
        for base in &self.bases {
            totals.merge(&base.totals());
        }
        totals
    }

    /// Short plain-text summary, used for notifications.
    pub fn summary(&self) -> String {
        let totals = self.totals();
        let mut lines = vec![
            format!("Bases: {}", self.bases.len()),
            format!("Rows: {}", totals.processed_rows),
            format!("Images: {}", totals.images),
            format!("Relayed: {} ({:.1}%)", totals.success, totals.success_rate()),
            format!("Failed: {}", totals.failure),
            format!("Skipped: {}", totals.skipped),
            format!("Ignored domain: {}", totals.ignored_domain),
        ];
        if self.retry.attempted > 0 {
            lines.push(format!("Retried: {} ({} recovered)", self.retry.attempted, self.retry.success));
        }
        lines.push(format!("Duration: {:.1}s", self.duration_secs));
        lines.join("\n")
    }
}

/// Result of `extract` for one product link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractSummary {
    pub url: String,
    pub site: Site,
    pub candidates: Vec<ExtractedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimized: Option<String>,
}

/// The tables of one base, for `tables`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseTables {
    pub base: String,
    pub tables: Vec<Table>,
}
