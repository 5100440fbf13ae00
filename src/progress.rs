//! Persisted per-table progress and cumulative run totals.

use crate::format::TableStats;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableProgress {
    #[serde(default)]
    pub last_processed_row: usize,
    #[serde(default)]
    pub stats: TableStats,
}

/// JSON file of table name → progress, written at most once per interval.
pub struct ProgressStore {
    path: PathBuf,
    save_interval: Duration,
    tables: Option<BTreeMap<String, TableProgress>>,
    last_save: Option<Instant>,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>, save_interval: Duration) -> Self {
        Self { path: path.into(), save_interval, tables: None, last_save: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tables(&mut self) -> &mut BTreeMap<String, TableProgress> {
        let path = &self.path;
        self.tables.get_or_insert_with(|| load_tables(path))
    }

    pub fn get(&mut self, table: &str) -> Option<TableProgress> {
        self.tables().get(table).cloned()
    }

    /// Replaces a table's entry and saves if the interval has passed.
    pub fn update(&mut self, table: &str, progress: TableProgress) -> Result<()> {
        self.tables().insert(table.to_string(), progress);
        self.save(false)
    }

    /// Writes the file unless the last write was within the interval.
    pub fn save(&mut self, force: bool) -> Result<()> {
        if !force {
            if let Some(last) = self.last_save {
                if last.elapsed() < self.save_interval {
                    return Ok(());
                }
            }
        }

        let json = serde_json::to_string_pretty(&*self.tables())?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write progress file: {}", self.path.display()))?;

        self.last_save = Some(Instant::now());
        debug!("Progress saved to {}", self.path.display());
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.tables = Some(BTreeMap::new());
        self.save(true)
    }
}

fn load_tables(path: &Path) -> BTreeMap<String, TableProgress> {
    if !path.exists() {
        return BTreeMap::new();
    }

    let parsed = std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|content| serde_json::from_str(&content).map_err(anyhow::Error::from));

    match parsed {
        Ok(tables) => tables,
        Err(e) => {
            error!("Failed to load progress file {}: {}", path.display(), e);
            BTreeMap::new()
        }
    }
}

/// Cumulative statistics across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total_runs: u64,
    #[serde(default)]
    pub total_images: u64,
    #[serde(default)]
    pub total_success: u64,
    #[serde(default)]
    pub total_ignored_domain: u64,
}

impl RunTotals {
    /// Loads the totals file; a missing file means no runs yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read stats file: {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse stats file: {}", path.display()))
    }

    /// Adds one run.
    pub fn add(&mut self, stats: &TableStats) {
        self.last_run = Some(Utc::now());
        self.total_runs += 1;
        self.total_images += stats.images as u64;
        self.total_success += stats.success as u64;
        self.total_ignored_domain += stats.ignored_domain as u64;
    }

    /// Loads, adds one run, and writes the file back.
    pub fn record(path: &Path, stats: &TableStats) -> Result<Self> {
        let mut totals = Self::load(path).unwrap_or_else(|e| {
            error!("{:#}", e);
            Self::default()
        });
        totals.add(stats);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&totals)?)
            .with_context(|| format!("Failed to write stats file: {}", path.display()))?;
        Ok(totals)
    }
}
