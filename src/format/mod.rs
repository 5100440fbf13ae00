//! Output formatting for run reports (table, JSON, markdown).

pub mod report;

pub use report::{
    BaseReport, BaseTables, ExtractSummary, FetchReport, RelayReport, RetrySummary, RowOutcome, RowStatus,
    SuccessRecord, TableReport, TableStats,
};

use crate::config::OutputFormat;
use crate::table::ColumnType;

/// Formats reports for output.
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Creates a new formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format_fetch(&self, report: &FetchReport) -> String {
        match self.format {
            OutputFormat::Json => Self::json(report),
            OutputFormat::Table => self.table_fetch(report),
            OutputFormat::Markdown => self.markdown_fetch(report),
        }
    }

    pub fn format_relay(&self, report: &RelayReport) -> String {
        match self.format {
            OutputFormat::Json => Self::json(report),
            OutputFormat::Table => self.table_relay(report),
            OutputFormat::Markdown => self.markdown_relay(report),
        }
    }

    pub fn format_extract(&self, summary: &ExtractSummary) -> String {
        match self.format {
            OutputFormat::Json => Self::json(summary),
            OutputFormat::Table => self.table_extract(summary),
            OutputFormat::Markdown => self.markdown_extract(summary),
        }
    }

    pub fn format_tables(&self, bases: &[BaseTables]) -> String {
        if bases.is_empty() {
            return match self.format {
                OutputFormat::Json => "[]".to_string(),
                _ => "No bases configured.".to_string(),
            };
        }

        match self.format {
            OutputFormat::Json => Self::json(bases),
            OutputFormat::Table => self.table_tables(bases),
            OutputFormat::Markdown => self.markdown_tables(bases),
        }
    }

    fn json<T: serde::Serialize + ?Sized>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }

    fn truncate(text: &str, width: usize) -> String {
        if text.chars().count() > width {
            format!("{}...", text.chars().take(width.saturating_sub(3)).collect::<String>())
        } else {
            text.to_string()
        }
    }

    // Table formatting

    fn table_fetch(&self, report: &FetchReport) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Table:          {}", report.table));
        lines.push(format!("Rows:           {} of {}", report.processed(), report.total_rows));
        lines.push(format!("Updated:        {}", report.updated));
        lines.push(format!("Unchanged:      {}", report.unchanged));
        lines.push(format!("Empty links:    {}", report.empty_links));
        lines.push(format!("Kept original:  {}", report.kept_original));
        lines.push(format!("Failed:         {}", report.failed));
        lines.push(format!("History:        {} new, {} reused", report.new, report.reused));
        lines.push(format!("Duration:       {:.1}s", report.duration_secs));

        let notable: Vec<_> = report.rows.iter().filter(|r| r.status != RowStatus::Unchanged).collect();
        if !notable.is_empty() {
            let status_width = 14;
            let label_width = 30;
            lines.push(String::new());
            lines.push(format!("{:<status_width$}  {:<label_width$}  {}", "Status", "Row", "Detail"));
            lines.push(format!("{:-<status_width$}  {:-<label_width$}  {:-<40}", "", "", ""));
            for row in notable {
                let detail = row.image_url.as_deref().or(row.message.as_deref()).unwrap_or("");
                lines.push(format!(
                    "{:<status_width$}  {:<label_width$}  {}",
                    row.status.to_string(),
                    Self::truncate(&row.row_label, label_width),
                    detail
                ));
            }
        }

        lines.join("\n")
    }

    fn table_relay(&self, report: &RelayReport) -> String {
        let name_width = 24;
        let mut lines = Vec::new();

        lines.push(format!(
            "{:<name_width$}  {:>6}  {:>6}  {:>7}  {:>6}  {:>7}  {:>7}",
            "Base / Table", "Rows", "Images", "Relayed", "Failed", "Skipped", "Ignored"
        ));
        lines.push(format!("{:-<name_width$}  {:-<6}  {:-<6}  {:-<7}  {:-<6}  {:-<7}  {:-<7}", "", "", "", "", "", "", ""));

        for base in &report.bases {
            if let Some(error) = &base.error {
                lines.push(format!("{:<name_width$}  error: {}", Self::truncate(&base.name, name_width), error));
                continue;
            }
            lines.push(Self::truncate(&base.name, name_width));
            for table in &base.tables {
                let s = &table.stats;
                lines.push(format!(
                    "{:<name_width$}  {:>6}  {:>6}  {:>7}  {:>6}  {:>7}  {:>7}",
                    Self::truncate(&format!("  {}", table.name), name_width),
                    s.processed_rows,
                    s.images,
                    s.success,
                    s.failure,
                    s.skipped,
                    s.ignored_domain
                ));
                if let Some(error) = &table.error {
                    lines.push(format!("    stopped early: {}", error));
                }
            }
        }

        let totals = report.totals();
        lines.push(String::new());
        lines.push(format!(
            "Total: {} images, {} relayed ({:.1}%), {} failed, {} reused from history",
            totals.images,
            totals.success,
            totals.success_rate(),
            totals.failure,
            totals.reused
        ));
        if report.retry.attempted > 0 {
            lines.push(format!(
                "Retry: {} attempted, {} recovered, {} still failing",
                report.retry.attempted, report.retry.success, report.retry.failed
            ));
        }
        for failure in &report.outstanding {
            lines.push(format!(
                "  ✗ {}/{} [{}] {}: {}",
                failure.base, failure.table, failure.column, failure.url, failure.error
            ));
        }
        lines.push(format!("Duration: {:.1}s", report.duration_secs));

        lines.join("\n")
    }

    fn table_extract(&self, summary: &ExtractSummary) -> String {
        let mut lines = Vec::new();

        lines.push(format!("URL:        {}", summary.url));
        lines.push(format!("Site:       {} ({})", summary.site, summary.site.domain()));
        lines.push(format!("Candidates: {}", summary.candidates.len()));
        for candidate in &summary.candidates {
            let size = match (candidate.width, candidate.height) {
                (Some(w), Some(h)) => format!(" {}x{}", w, h),
                _ => String::new(),
            };
            lines.push(format!("  [{}]{} {}", candidate.source, size, candidate.url));
        }
        lines.push(format!("Selected:   {}", summary.selected.as_deref().unwrap_or("none")));
        lines.push(format!("Optimized:  {}", summary.optimized.as_deref().unwrap_or("none")));

        lines.join("\n")
    }

    fn table_tables(&self, bases: &[BaseTables]) -> String {
        let mut lines = Vec::new();

        for base in bases {
            lines.push(format!("{}:", base.base));
            for table in &base.tables {
                let images: Vec<_> = table.image_columns().map(|c| c.name.as_str()).collect();
                let rich: Vec<_> = table
                    .columns
                    .iter()
                    .filter(|c| c.column_type == ColumnType::LongText)
                    .map(|c| c.name.as_str())
                    .collect();
                lines.push(format!("  {} ({} columns)", table.name, table.columns.len()));
                if !images.is_empty() {
                    lines.push(format!("    images:    {}", images.join(", ")));
                }
                if !rich.is_empty() {
                    lines.push(format!("    long text: {}", rich.join(", ")));
                }
            }
        }

        lines.join("\n")
    }

    // Markdown formatting

    fn markdown_fetch(&self, report: &FetchReport) -> String {
        let mut lines = Vec::new();

        lines.push(format!("## Fetch: {}", report.table));
        lines.push(String::new());
        lines.push(format!("- **Rows:** {} of {}", report.processed(), report.total_rows));
        lines.push(format!("- **Updated:** {}", report.updated));
        lines.push(format!("- **Unchanged:** {}", report.unchanged));
        lines.push(format!("- **Empty links:** {}", report.empty_links));
        lines.push(format!("- **Kept original:** {}", report.kept_original));
        lines.push(format!("- **Failed:** {}", report.failed));
        lines.push(format!("- **Duration:** {:.1}s", report.duration_secs));

        let failed: Vec<_> = report.rows.iter().filter(|r| r.status == RowStatus::Failed).collect();
        if !failed.is_empty() {
            lines.push(String::new());
            lines.push("| Row | Error |".to_string());
            lines.push("|-----|-------|".to_string());
            for row in failed {
                lines.push(format!(
                    "| {} | {} |",
                    Self::truncate(&row.row_label, 40),
                    row.message.as_deref().unwrap_or("")
                ));
            }
        }

        lines.join("\n")
    }

    fn markdown_relay(&self, report: &RelayReport) -> String {
        let mut lines = Vec::new();

        lines.push("## Image relay".to_string());
        lines.push(String::new());
        lines.push("| Base | Table | Rows | Images | Relayed | Failed | Skipped | Ignored |".to_string());
        lines.push("|------|-------|------|--------|---------|--------|---------|---------|".to_string());

        for base in &report.bases {
            if let Some(error) = &base.error {
                lines.push(format!("| {} | *{}* | | | | | | |", base.name, error));
                continue;
            }
            for table in &base.tables {
                let s = &table.stats;
                let name = match &table.error {
                    Some(error) => format!("{} (*stopped early: {}*)", table.name, error),
                    None => table.name.clone(),
                };
                lines.push(format!(
                    "| {} | {} | {} | {} | {} | {} | {} | {} |",
                    base.name, name, s.processed_rows, s.images, s.success, s.failure, s.skipped, s.ignored_domain
                ));
            }
        }

        let totals = report.totals();
        lines.push(String::new());
        lines.push(format!(
            "*{} of {} images relayed ({:.1}%) in {:.1}s*",
            totals.success,
            totals.images,
            totals.success_rate(),
            report.duration_secs
        ));

        if !report.outstanding.is_empty() {
            lines.push(String::new());
            lines.push("### Failures".to_string());
            lines.push(String::new());
            for failure in &report.outstanding {
                lines.push(format!(
                    "- {} / {} / {} ({}): `{}`: {}",
                    failure.base, failure.table, failure.column, failure.row_label, failure.url, failure.error
                ));
            }
        }

        lines.join("\n")
    }

    fn markdown_extract(&self, summary: &ExtractSummary) -> String {
        let mut lines = Vec::new();

        lines.push(format!("## {}", summary.url));
        lines.push(String::new());
        lines.push(format!("- **Site:** {}", summary.site.domain()));
        if let Some(selected) = &summary.selected {
            lines.push(format!("- **Selected:** {}", selected));
        }
        if let Some(optimized) = &summary.optimized {
            lines.push(format!("- **Optimized:** ![image]({})", optimized));
        }
        if !summary.candidates.is_empty() {
            lines.push(String::new());
            lines.push("| Source | Size | URL |".to_string());
            lines.push("|--------|------|-----|".to_string());
            for candidate in &summary.candidates {
                let size = match (candidate.width, candidate.height) {
                    (Some(w), Some(h)) => format!("{}x{}", w, h),
                    _ => String::new(),
                };
                lines.push(format!("| {} | {} | {} |", candidate.source, size, candidate.url));
            }
        }

        lines.join("\n")
    }

    fn markdown_tables(&self, bases: &[BaseTables]) -> String {
        let mut lines = Vec::new();

        lines.push("| Base | Table | Columns | Image columns |".to_string());
        lines.push("|------|-------|---------|---------------|".to_string());
        for base in bases {
            for table in &base.tables {
                let images: Vec<_> = table.image_columns().map(|c| c.name.as_str()).collect();
                lines.push(format!(
                    "| {} | {} | {} | {} |",
                    base.base,
                    table.name,
                    table.columns.len(),
                    images.join(", ")
                ));
            }
        }

        lines.join("\n")
    }
}
