//! Moves images stored on the table service to the image host.

use crate::config::Config;
use crate::filters::{file_name, FilterChain, FilterChainBuilder, Verdict};
use crate::format::{BaseReport, Formatter, RelayReport, RetrySummary, SuccessRecord, TableReport, TableStats};
use crate::history::{FailureRecord, RelayHistory};
use crate::host::{HostClient, ImageHost};
use crate::http::{Pacing, RetryPolicy};
use crate::notify::Notifier;
use crate::progress::{ProgressStore, RunTotals, TableProgress};
use crate::table::{rich_text, ColumnType, ImageCell, Row, Table, TableApi, TableClient};
use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How a column stores its images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Image,
    RichText,
}

/// Executes the `relay` workflow.
pub struct RelayCommand {
    config: Config,
}

impl RelayCommand {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Connects to every configured base, relays, and returns formatted output.
    pub async fn execute(&self) -> Result<String> {
        if self.config.table.bases.is_empty() {
            anyhow::bail!("No base tokens configured. Set SEATABLE_API_TOKENS or [table].bases in config.toml");
        }

        let host = HostClient::new(&self.config.host).context("Failed to create upload client")?;
        let retry = RetryPolicy::new(self.config.table.max_retries, self.config.table.backoff_factor_ms);

        let mut clients = Vec::new();
        let mut unreachable = Vec::new();
        for (index, base) in self.config.table.bases.iter().enumerate() {
            match TableClient::connect(&self.config.table.server_url, &base.token, retry.clone()).await {
                Ok(client) => clients.push(client.with_name(base.name.clone())),
                Err(e) => {
                    let name = base.name.clone().unwrap_or_else(|| format!("base-{}", index + 1));
                    error!("Failed to connect to base {}: {:#}", name, e);
                    let mut report = BaseReport::new(name);
                    report.error = Some(format!("{:#}", e));
                    unreachable.push(report);
                }
            }
        }

        let apis: Vec<&dyn TableApi> = clients.iter().map(|c| c as &dyn TableApi).collect();
        let report = self.execute_with_clients(&apis, unreachable, &host).await?;
        Ok(Formatter::new(self.config.format).format_relay(&report))
    }

    /// Relays every base with the given clients (for testing).
    ///
    /// `unreachable` lists bases that could not be connected; they appear in
    /// the report and the notification as errors.
    pub async fn execute_with_clients(
        &self,
        bases: &[&dyn TableApi],
        unreachable: Vec<BaseReport>,
        host: &dyn ImageHost,
    ) -> Result<RelayReport> {
        let started = Instant::now();
        let mut run = RelayRun::new(&self.config, host);
        let mut report = RelayReport::default();

        let named = unique_names(bases);
        for (name, api) in &named {
            info!("Processing base {}", name);
            report.bases.push(run.relay_base(name, *api).await);
        }
        report.bases.extend(unreachable);

        let by_name: HashMap<String, &dyn TableApi> = named.into_iter().collect();
        let (retry, outstanding) = run.retry_pass(&by_name).await;
        report.retry = retry;
        report.outstanding = outstanding;
        report.duration_secs = started.elapsed().as_secs_f64();

        run.finish(&report).await;
        Ok(report)
    }
}

/// Pairs each base with a unique display name.
fn unique_names<'a>(bases: &[&'a dyn TableApi]) -> Vec<(String, &'a dyn TableApi)> {
    let mut seen = HashSet::new();
    let mut unnamed = 0;

    bases
        .iter()
        .map(|api| {
            let mut name = api.base_name().trim().to_string();
            if name.is_empty() || seen.contains(&name) {
                loop {
                    unnamed += 1;
                    name = format!("unnamed-{}", unnamed);
                    if !seen.contains(&name) {
                        break;
                    }
                }
            }
            seen.insert(name.clone());
            (name, *api)
        })
        .collect()
}

/// State carried through one relay run.
struct RelayRun<'a> {
    config: &'a Config,
    host: &'a dyn ImageHost,
    filters: FilterChain,
    history: RelayHistory,
    progress: Option<ProgressStore>,
    image_pause: Pacing,
}

impl<'a> RelayRun<'a> {
    fn new(config: &'a Config, host: &'a dyn ImageHost) -> Self {
        let filters = FilterChainBuilder::from_config(&config.relay, &config.host).build();
        debug!("Filters: {}", filters.descriptions().join("; "));

        Self {
            config,
            host,
            filters,
            history: RelayHistory::new(),
            progress: config
                .progress_file
                .as_ref()
                .map(|path| ProgressStore::new(path, Duration::from_secs(config.progress_interval_secs))),
            image_pause: Pacing::new(config.relay.request_delay_ms, 0),
        }
    }

    async fn relay_base(&mut self, name: &str, api: &dyn TableApi) -> BaseReport {
        let mut report = BaseReport::new(name);

        let metadata = match api.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                error!("Failed to read metadata of base {}: {:#}", name, e);
                report.error = Some(format!("{:#}", e));
                return report;
            }
        };

        let config = self.config;
        let selections = &config.relay.tables;
        for table in &metadata.tables {
            if !selections.is_empty() && !selections.iter().any(|s| s.name == table.name) {
                debug!("Skipping table {} (not selected)", table.name);
                continue;
            }

            let columns = self.columns_for(table);
            if columns.is_empty() {
                debug!("Table {} has no image columns to process", table.name);
                continue;
            }

            let table_report = self.relay_table(name, api, &table.name, &columns).await;
            report.tables.push(table_report);
        }

        let totals = report.totals();
        info!(
            "Base {} done: {} images, {} relayed, {} failed, {} skipped, {} ignored",
            name, totals.images, totals.success, totals.failure, totals.skipped, totals.ignored_domain
        );
        report
    }

    /// Image columns to process, plus long-text columns when enabled.
    fn columns_for(&self, table: &Table) -> Vec<(String, CellKind)> {
        let relay = &self.config.relay;
        let selected = relay
            .tables
            .iter()
            .find(|s| s.name == table.name)
            .map(|s| s.columns.as_slice())
            .unwrap_or_default();

        table
            .columns
            .iter()
            .filter(|c| !relay.skip_columns.contains(&c.name))
            .filter(|c| selected.is_empty() || selected.contains(&c.name))
            .filter_map(|c| {
                let kind = match c.column_type {
                    ColumnType::Image => CellKind::Image,
                    ColumnType::File if selected.contains(&c.name) => CellKind::Image,
                    ColumnType::LongText if relay.process_rich_text => CellKind::RichText,
                    _ => return None,
                };
                Some((c.name.clone(), kind))
            })
            .collect()
    }

    async fn relay_table(
        &mut self,
        base: &str,
        api: &dyn TableApi,
        table: &str,
        columns: &[(String, CellKind)],
    ) -> TableReport {
        let mut report = TableReport::new(table);
        report.stats.columns = columns.iter().map(|(name, _)| name.clone()).collect();
        info!("Table {}: columns {}", table, report.stats.columns.join(", "));

        let page_size = self.config.table.page_size.max(1);
        let mut start = 0;

        loop {
            let rows = match api.list_rows(table, start, page_size).await {
                Ok(rows) => rows,
                Err(e) => {
                    error!("Failed to read rows of {} from {}: {:#}", table, start, e);
                    report.error = Some(format!("{:#}", e));
                    break;
                }
            };
            let count = rows.len();
            if count == 0 {
                break;
            }
            info!("Table {}: page {} ({} rows)", table, start / page_size + 1, count);

            for row in &rows {
                report.stats.total_rows += 1;
                report.stats.processed_rows += 1;
                self.relay_row(base, api, table, columns, row, &mut report).await;
            }

            start += count;
            self.save_progress(base, table, start, &report.stats);
            if count < page_size {
                break;
            }
        }

        report
    }

    fn save_progress(&mut self, base: &str, table: &str, processed: usize, stats: &TableStats) {
        if let Some(progress) = self.progress.as_mut() {
            let entry = TableProgress { last_processed_row: processed, stats: stats.clone() };
            if let Err(e) = progress.update(&format!("{}/{}", base, table), entry) {
                warn!("{:#}", e);
            }
        }
    }

    async fn relay_row(
        &mut self,
        base: &str,
        api: &dyn TableApi,
        table: &str,
        columns: &[(String, CellKind)],
        row: &Row,
        report: &mut TableReport,
    ) {
        let label = row.label();
        let mut changes = Map::new();
        let mut relayed: Vec<SuccessRecord> = Vec::new();

        for (column, kind) in columns {
            let urls: Vec<String> = match kind {
                CellKind::Image => {
                    ImageCell::from_value(row.get(column)).urls().into_iter().map(String::from).collect()
                }
                CellKind::RichText => rich_text::cell_image_urls(row.get(column)),
            };

            let mut replacements = Vec::new();
            for url in urls {
                report.stats.images += 1;

                if let Verdict::Skip(reason) = self.filters.verdict(&url) {
                    debug!("Skipping {} ({})", url, reason);
                    report.stats.add_skip(reason);
                    continue;
                }

                let hosted = match self.history.hosted_url(&url) {
                    Some(hosted) => {
                        report.stats.reused += 1;
                        hosted.to_string()
                    }
                    None => {
                        let result = self.relay_image(api, &url).await;
                        self.image_pause.wait().await;
                        match result {
                            Ok(hosted) => {
                                self.history.record_success(&url, &hosted);
                                hosted
                            }
                            Err(e) => {
                                error!("✗ {}/{} row {} [{}]: {:#}", base, table, row.id, column, e);
                                report.stats.failure += 1;
                                let record = FailureRecord {
                                    base: base.to_string(),
                                    table: table.to_string(),
                                    row_id: row.id.clone(),
                                    column: column.clone(),
                                    row_label: label.clone(),
                                    url: url.clone(),
                                    error: format!("{:#}", e),
                                    timestamp: Utc::now(),
                                };
                                self.history.record_failure(record.clone());
                                report.failures.push(record);
                                continue;
                            }
                        }
                    }
                };

                relayed.push(SuccessRecord {
                    base: base.to_string(),
                    table: table.to_string(),
                    row_id: row.id.clone(),
                    column: column.clone(),
                    row_label: label.clone(),
                    source: url.clone(),
                    hosted: hosted.clone(),
                    timestamp: Utc::now(),
                });
                replacements.push((url, hosted));
            }

            if replacements.is_empty() {
                continue;
            }

            let value = match kind {
                CellKind::Image => {
                    let mut cell = ImageCell::from_value(row.get(column));
                    for (old, new) in &replacements {
                        cell.replace(old, new);
                    }
                    cell.into_value()
                }
                CellKind::RichText => {
                    let mut value = row.get(column).cloned().unwrap_or(Value::Null);
                    for (old, new) in &replacements {
                        rich_text::replace_url(&mut value, old, new);
                    }
                    value
                }
            };
            changes.insert(column.clone(), value);
        }

        if changes.is_empty() {
            return;
        }

        match api.update_row(table, &row.id, changes).await {
            Ok(()) => {
                report.stats.updated_rows += 1;
                report.stats.success += relayed.len();
                for record in &relayed {
                    info!("✓ {} [{}] {} -> {}", record.row_label, record.column, record.source, record.hosted);
                }
                report.successes.extend(relayed);
            }
            Err(e) => {
                error!("Failed to update row {} in {}: {:#}", row.id, table, e);
                report.stats.failure += relayed.len();
                for record in relayed {
                    let failure = FailureRecord {
                        base: record.base,
                        table: record.table,
                        row_id: record.row_id,
                        column: record.column,
                        row_label: record.row_label,
                        url: record.source,
                        error: format!("Row update failed: {:#}", e),
                        timestamp: Utc::now(),
                    };
                    self.history.record_failure(failure.clone());
                    report.failures.push(failure);
                }
            }
        }
    }

    /// Downloads one image from the table service and uploads it to the host.
    async fn relay_image(&self, api: &dyn TableApi, url: &str) -> Result<String> {
        let bytes = api.download(url).await.with_context(|| format!("Download failed: {}", url))?;
        self.host.upload(bytes, &file_name(url)).await
    }

    /// Second chance for every failure: re-read the row, swap the URL, update.
    async fn retry_pass(&mut self, apis: &HashMap<String, &dyn TableApi>) -> (RetrySummary, Vec<FailureRecord>) {
        let pending = self.history.pending_grouped();
        let mut summary = RetrySummary::default();
        let mut outstanding = Vec::new();

        let total: usize = pending.values().flat_map(|tables| tables.values()).map(Vec::len).sum();
        if total == 0 {
            return (summary, outstanding);
        }
        info!("Retrying {} failed images", total);

        for (base, tables) in pending {
            for (table, records) in tables {
                for record in records {
                    summary.attempted += 1;

                    let result = match apis.get(&base) {
                        Some(api) => self.retry_record(*api, &record).await,
                        None => Err(anyhow::anyhow!("Base {} is not connected", base)),
                    };

                    match result {
                        Ok(()) => {
                            summary.success += 1;
                            info!("✓ Retry succeeded: {}/{} row {}", base, table, record.row_id);
                        }
                        Err(e) => {
                            summary.failed += 1;
                            warn!("✗ Retry failed: {}/{} row {}: {:#}", base, table, record.row_id, e);
                            outstanding.push(FailureRecord {
                                error: format!("{:#}", e),
                                timestamp: Utc::now(),
                                ..record
                            });
                        }
                    }
                }
            }
        }

        info!(
            "Retry done: {} attempted, {} succeeded, {} still failing",
            summary.attempted, summary.success, summary.failed
        );
        (summary, outstanding)
    }

    async fn retry_record(&mut self, api: &dyn TableApi, record: &FailureRecord) -> Result<()> {
        let hosted = match self.history.hosted_url(&record.url) {
            Some(hosted) => hosted.to_string(),
            None => {
                let hosted = self.relay_image(api, &record.url).await;
                self.image_pause.wait().await;
                let hosted = hosted?;
                self.history.record_success(&record.url, &hosted);
                hosted
            }
        };

        let row = api.get_row(&record.table, &record.row_id).await?;
        let Some((value, changed)) = swap_url(row.get(&record.column), &record.url, &hosted) else {
            debug!("Row {} no longer references {}", record.row_id, record.url);
            return Ok(());
        };
        if !changed {
            return Ok(());
        }

        let mut values = Map::new();
        values.insert(record.column.clone(), value);
        api.update_row(&record.table, &record.row_id, values).await
    }

    /// Writes run totals and progress, then sends the notification.
    async fn finish(&mut self, report: &RelayReport) {
        if let Some(path) = &self.config.stats_file {
            match RunTotals::record(path, &report.totals()) {
                Ok(totals) => debug!("Run totals: {} runs, {} images", totals.total_runs, totals.total_images),
                Err(e) => warn!("{:#}", e),
            }
        }

        if let Some(progress) = self.progress.as_mut() {
            if let Err(e) = progress.save(true) {
                warn!("{:#}", e);
            }
        }

        self.history.clear();

        let mut content = report.summary();
        for base in &report.bases {
            if let Some(error) = &base.error {
                content.push_str(&format!("\nBase {} failed: {}", base.name, error));
            }
            for table in &base.tables {
                if let Some(error) = &table.error {
                    content.push_str(&format!("\nTable {}/{} stopped early: {}", base.name, table.name, error));
                }
            }
        }
        Notifier::new(self.config.notify_url.clone()).notify("SeaTable image relay", &content).await;
    }
}

/// Replaces `old` in a cell of either kind. Returns the new value and
/// whether it changed, or `None` when the cell no longer mentions `old`
/// nor `new`.
fn swap_url(cell: Option<&Value>, old: &str, new: &str) -> Option<(Value, bool)> {
    let mut image_cell = ImageCell::from_value(cell);
    if image_cell.replace(old, new) {
        return Some((image_cell.into_value(), true));
    }

    let mut value = cell.cloned().unwrap_or(Value::Null);
    if rich_text::replace_url(&mut value, old, new) {
        return Some((value, true));
    }

    let already = image_cell.urls().contains(&new) || rich_text::cell_image_urls(cell).iter().any(|u| u == new);
    already.then_some((value, false))
}
