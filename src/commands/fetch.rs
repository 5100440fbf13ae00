//! Fills a table's image column from the Amazon product page linked in each row.

use crate::amazon::upscale::strip_query;
use crate::amazon::{optimize, AmazonClient, AmazonFetch, ExtractOptions, Extractor, ImageVerifier, ProductUrl};
use crate::config::{Config, SinkKind};
use crate::filters::file_name;
use crate::format::{FetchReport, Formatter, RowOutcome, RowStatus};
use crate::history::ProductHistory;
use crate::host::{HostClient, ImageHost};
use crate::http::{retry_async, Pacing, RetryPolicy};
use crate::table::{link_url, ImageCell, Row, TableApi, TableClient};
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{error, info, warn};

/// Where a found image ends up.
pub enum ImageSink<'a> {
    /// The Amazon URL itself is written to the cell
    Direct,
    /// The image is relayed through the image host
    Host(&'a dyn ImageHost),
    /// The image is stored in the base's own asset storage
    Asset,
}

impl ImageSink<'_> {
    pub fn kind(&self) -> SinkKind {
        match self {
            ImageSink::Direct => SinkKind::Direct,
            ImageSink::Host(_) => SinkKind::Host,
            ImageSink::Asset => SinkKind::Asset,
        }
    }

    /// Returns the URL to write into the image cell.
    pub async fn store<A, F>(&self, api: &A, fetcher: &F, url: &str) -> Result<String>
    where
        A: TableApi + ?Sized,
        F: AmazonFetch + ?Sized,
    {
        match self {
            ImageSink::Direct => Ok(url.to_string()),
            ImageSink::Host(host) => {
                let bytes = fetcher.download(url).await?;
                host.upload(bytes, &file_name(url)).await
            }
            ImageSink::Asset => {
                let bytes = fetcher.download(url).await?;
                api.upload_asset(bytes, &file_name(url)).await
            }
        }
    }
}

/// Executes the `fetch` workflow.
pub struct FetchCommand {
    config: Config,
    row_id: Option<String>,
}

impl FetchCommand {
    pub fn new(config: Config) -> Self {
        Self { config, row_id: None }
    }

    /// Restricts the run to one row.
    pub fn row_id(mut self, row_id: Option<String>) -> Self {
        self.row_id = row_id;
        self
    }

    /// Runs against every configured base and returns formatted output.
    pub async fn execute(&self) -> Result<String> {
        if self.config.table.bases.is_empty() {
            anyhow::bail!("No base tokens configured. Set SEATABLE_API_TOKEN or [table].bases in config.toml");
        }

        let fetcher = AmazonClient::new(&self.config.scrape).context("Failed to create HTTP client")?;
        let host = match self.config.fetch.sink {
            SinkKind::Host => Some(HostClient::new(&self.config.host)?),
            _ => None,
        };
        let sink = match (&host, self.config.fetch.sink) {
            (Some(host), _) => ImageSink::Host(host),
            (None, SinkKind::Asset) => ImageSink::Asset,
            _ => ImageSink::Direct,
        };

        let retry = RetryPolicy::new(self.config.table.max_retries, self.config.table.backoff_factor_ms);
        let formatter = Formatter::new(self.config.format);
        let mut outputs = Vec::new();

        for base in &self.config.table.bases {
            let api = TableClient::connect(&self.config.table.server_url, &base.token, retry.clone())
                .await?
                .with_name(base.name.clone());
            let report = self.execute_with_clients(&api, &fetcher, &sink).await?;
            outputs.push(formatter.format_fetch(&report));
        }

        Ok(outputs.join("\n\n"))
    }

    /// Runs against one base with the given clients (for testing).
    pub async fn execute_with_clients<A, F>(&self, api: &A, fetcher: &F, sink: &ImageSink<'_>) -> Result<FetchReport>
    where
        A: TableApi + ?Sized,
        F: AmazonFetch + ?Sized,
    {
        let started = Instant::now();
        let settings = &self.config.fetch;
        let mut report = FetchReport::new(&settings.table);

        let rows = match &self.row_id {
            Some(id) => vec![api.get_row(&settings.table, id).await?],
            None => crate::table::all_rows(api, &settings.table, self.config.table.page_size).await?,
        };
        report.total_rows = rows.len();
        info!(
            "Processing {} rows of {} in base {} (sink: {})",
            rows.len(),
            settings.table,
            api.base_name(),
            sink.kind()
        );

        let row_pause = Pacing::new(self.config.scrape.row_delay_ms, self.config.scrape.row_jitter_ms);
        let mut history = ProductHistory::new();
        let total = rows.len();

        for (index, row) in rows.iter().enumerate() {
            let pct = (index + 1) as f64 * 100.0 / total as f64;
            info!("Progress: {}/{} ({:.1}%) {}", index + 1, total, pct, row.label());

            let (outcome, fetched) = self.process_row(api, fetcher, sink, &mut history, row).await;
            match outcome.status {
                RowStatus::Failed => {
                    error!("Row {} failed: {}", row.id, outcome.message.as_deref().unwrap_or(""))
                }
                status => info!("Row {}: {}", row.id, status),
            }
            report.record(outcome);

            if fetched && index + 1 < total {
                row_pause.wait().await;
            }
        }

        let stats = history.stats();
        report.new = stats.new;
        report.reused = stats.reused;
        report.duration_secs = started.elapsed().as_secs_f64();

        info!(
            "Done: {} updated, {} unchanged, {} empty links, {} kept original, {} failed",
            report.updated, report.unchanged, report.empty_links, report.kept_original, report.failed
        );
        Ok(report)
    }

    /// Handles one row. The flag tells whether Amazon was contacted.
    async fn process_row<A, F>(
        &self,
        api: &A,
        fetcher: &F,
        sink: &ImageSink<'_>,
        history: &mut ProductHistory,
        row: &Row,
    ) -> (RowOutcome, bool)
    where
        A: TableApi + ?Sized,
        F: AmazonFetch + ?Sized,
    {
        let settings = &self.config.fetch;
        let label = row.label();

        let Some(link) = link_url(row.get(&settings.link_column)) else {
            return (RowOutcome::new(&row.id, label, RowStatus::EmptyLink), false);
        };

        let product = match ProductUrl::parse(&link) {
            Ok(product) => product,
            Err(e) => {
                return (RowOutcome::new(&row.id, label, RowStatus::Failed).with_message(e.to_string()), false)
            }
        };

        let current = ImageCell::from_value(row.get(&settings.image_column)).first_url().map(String::from);

        let (image, fetched) = match history.lookup(&product) {
            Some(url) => (url, false),
            None => match self.find_image(fetcher, &product).await {
                Ok(Some(url)) => {
                    history.record(&product, &url, true);
                    (url, true)
                }
                Ok(None) => {
                    history.record(&product, "", false);
                    return (self.not_found(row, label, current.is_some(), "No image found on product page"), true);
                }
                Err(e) => {
                    history.record(&product, "", false);
                    return (self.not_found(row, label, current.is_some(), &format!("{:#}", e)), true);
                }
            },
        };

        if current.as_deref().map(strip_query) == Some(strip_query(&image)) {
            history.mark_unchanged();
            return (RowOutcome::new(&row.id, label, RowStatus::Unchanged).with_image(image), fetched);
        }

        let stored = match sink.store(api, fetcher, &image).await {
            Ok(url) => url,
            Err(e) => {
                let message = format!("Failed to store image: {:#}", e);
                return (self.not_found(row, label, current.is_some(), &message), fetched);
            }
        };

        let mut values = Map::new();
        values.insert(settings.image_column.clone(), Value::Array(vec![Value::String(stored.clone())]));

        match self.update_with_retry(api, &row.id, values).await {
            Ok(()) => (RowOutcome::new(&row.id, label, RowStatus::Updated).with_image(stored), fetched),
            Err(e) => (
                RowOutcome::new(&row.id, label, RowStatus::Failed).with_message(format!("{:#}", e)),
                fetched,
            ),
        }
    }

    /// Scrapes, selects and upscales the product image.
    async fn find_image<F>(&self, fetcher: &F, product: &ProductUrl) -> Result<Option<String>>
    where
        F: AmazonFetch + ?Sized,
    {
        let scrape = &self.config.scrape;
        let extractor = Extractor::new(ExtractOptions { target_size: scrape.target_size });
        let verifier = ImageVerifier::new(fetcher, scrape.min_image_size);
        let verifier = scrape.verify_images.then_some(&verifier);

        let html = fetcher.product_page(product).await?;
        let Some(selected) = extractor.select(&html, verifier).await? else {
            return Ok(None);
        };
        info!("Selected image [{}]: {}", selected.source, selected.url);

        let optimized = optimize(&selected.url, scrape.target_size, verifier).await;
        Ok(Some(optimized))
    }

    fn not_found(&self, row: &Row, label: String, has_current: bool, message: &str) -> RowOutcome {
        if has_current {
            warn!("Keeping current image for row {}: {}", row.id, message);
            RowOutcome::new(&row.id, label, RowStatus::KeptOriginal).with_message(message)
        } else {
            RowOutcome::new(&row.id, label, RowStatus::Failed).with_message(message)
        }
    }

    async fn update_with_retry<A>(&self, api: &A, row_id: &str, values: Map<String, Value>) -> Result<()>
    where
        A: TableApi + ?Sized,
    {
        let settings = &self.config.fetch;
        let attempts = settings.update_retries.max(1);
        let policy = RetryPolicy::paced(
            attempts - 1,
            Pacing::new(settings.update_delay_ms, settings.update_jitter_ms),
        );

        retry_async(&policy, "Row update", |_| api.update_row(&settings.table, row_id, values.clone()))
            .await
            .map_err(|e| e.context(format!("Row update failed after {} attempts", attempts)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amazon::ImageProbe;
    use crate::config::OutputFormat;
    use crate::table::Metadata;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// In-memory table recording updates.
    struct MockTable {
        rows: Vec<Row>,
        updates: Mutex<Vec<(String, Map<String, Value>)>>,
        fail_updates: AtomicU32,
        uploads: Mutex<Vec<String>>,
    }

    impl MockTable {
        fn new(rows: Vec<Value>) -> Self {
            Self {
                rows: rows.into_iter().map(|r| serde_json::from_value(r).unwrap()).collect(),
                updates: Mutex::new(Vec::new()),
                fail_updates: AtomicU32::new(0),
                uploads: Mutex::new(Vec::new()),
            }
        }

        fn updates(&self) -> Vec<(String, Map<String, Value>)> {
            self.updates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TableApi for MockTable {
        fn base_name(&self) -> &str {
            "Test"
        }

        async fn metadata(&self) -> Result<Metadata> {
            Ok(Metadata::default())
        }

        async fn list_rows(&self, _table: &str, start: usize, limit: usize) -> Result<Vec<Row>> {
            Ok(self.rows.iter().skip(start).take(limit).cloned().collect())
        }

        async fn get_row(&self, _table: &str, row_id: &str) -> Result<Row> {
            self.rows
                .iter()
                .find(|r| r.id == row_id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("row not found"))
        }

        async fn update_row(&self, _table: &str, row_id: &str, values: Map<String, Value>) -> Result<()> {
            if self.fail_updates.load(Ordering::SeqCst) > 0 {
                self.fail_updates.fetch_sub(1, Ordering::SeqCst);
                anyhow::bail!("server busy");
            }
            self.updates.lock().unwrap().push((row_id.to_string(), values));
            Ok(())
        }

        async fn download(&self, _url: &str) -> Result<Vec<u8>> {
            Ok(vec![1, 2, 3])
        }

        async fn upload_asset(&self, _bytes: Vec<u8>, file_name: &str) -> Result<String> {
            self.uploads.lock().unwrap().push(file_name.to_string());
            Ok(format!("https://cloud.seatable.cn/workspace/1/asset/u/images/{}", file_name))
        }
    }

    /// Serves fixed pages keyed by product path and accepts every image.
    struct MockFetch {
        pages: HashMap<String, String>,
        page_calls: AtomicU32,
    }

    impl MockFetch {
        fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                page_calls: AtomicU32::new(0),
            }
        }

        fn page_calls(&self) -> u32 {
            self.page_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AmazonFetch for MockFetch {
        async fn product_page(&self, url: &ProductUrl) -> Result<String> {
            self.page_calls.fetch_add(1, Ordering::SeqCst);
            self.pages
                .iter()
                .find(|(k, _)| url.as_str().ends_with(k.as_str()))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| anyhow::anyhow!("Request failed with status: 404"))
        }

        async fn probe_image(&self, _url: &str, _read_limit: usize) -> Result<ImageProbe> {
            Ok(ImageProbe { status: 200, width: Some(1500), height: Some(1500), content_length: None })
        }

        async fn download(&self, _url: &str) -> Result<Vec<u8>> {
            Ok(vec![0xFF, 0xD8])
        }
    }

    struct MockHost;

    #[async_trait]
    impl ImageHost for MockHost {
        async fn upload(&self, _bytes: Vec<u8>, file_name: &str) -> Result<String> {
            Ok(format!("https://img.example.com/file/{}", file_name))
        }

        fn is_hosted(&self, url: &str) -> bool {
            url.contains("img.example.com")
        }
    }

    fn page_with(image_id: &str) -> String {
        format!(
            r#"<html><body><img id="landingImage" data-old-hires="https://m.media-amazon.com/images/I/{}._AC_SX300_.jpg"></body></html>"#,
            image_id
        )
    }

    fn optimized(image_id: &str) -> String {
        format!("https://m.media-amazon.com/images/I/{}._AC_SL1500_.jpg", image_id)
    }

    fn make_test_config() -> Config {
        let mut config = Config::default();
        config.format = OutputFormat::Json;
        config.scrape.delay_ms = 0;
        config.scrape.delay_jitter_ms = 0;
        config.scrape.row_delay_ms = 0;
        config.scrape.row_jitter_ms = 0;
        config.fetch.update_delay_ms = 0;
        config.fetch.update_jitter_ms = 0;
        config
    }

    #[tokio::test]
    async fn test_fetch_updates_rows() {
        let table = MockTable::new(vec![
            json!({"_id": "r1", "Name": "Lamp", "产品链接": "https://www.amazon.com/dp/B0LAMP0001?tag=x"}),
            json!({"_id": "r2", "Name": "Empty"}),
            json!({"_id": "r3", "Name": "Same", "产品链接": "https://www.amazon.com/dp/B0SAME0001",
                   "产品图片": [format!("{}?v=1", optimized("71same"))]}),
        ]);
        let fetcher = MockFetch::new(&[("/dp/B0LAMP0001", &page_with("71lamp")), ("/dp/B0SAME0001", &page_with("71same"))]);

        let report = FetchCommand::new(make_test_config())
            .execute_with_clients(&table, &fetcher, &ImageSink::Direct)
            .await
            .unwrap();

        assert_eq!(report.total_rows, 3);
        assert_eq!(report.updated, 1);
        assert_eq!(report.empty_links, 1);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.new, 2);

        let updates = table.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, "r1");
        assert_eq!(updates[0].1["产品图片"], json!([optimized("71lamp")]));
    }

    #[tokio::test]
    async fn test_fetch_reuses_history_for_same_product() {
        let table = MockTable::new(vec![
            json!({"_id": "r1", "产品链接": "https://www.amazon.com/dp/B0LAMP0001"}),
            json!({"_id": "r2", "产品链接": "https://www.amazon.com/dp/B0LAMP0001/ref=sr_1"}),
        ]);
        let fetcher = MockFetch::new(&[("/dp/B0LAMP0001", &page_with("71lamp"))]);

        let report = FetchCommand::new(make_test_config())
            .execute_with_clients(&table, &fetcher, &ImageSink::Direct)
            .await
            .unwrap();

        assert_eq!(fetcher.page_calls(), 1);
        assert_eq!(report.updated, 2);
        assert_eq!(report.reused, 1);
    }

    #[tokio::test]
    async fn test_fetch_keeps_original_when_extraction_fails() {
        let table = MockTable::new(vec![
            json!({"_id": "r1", "产品链接": "https://www.amazon.com/dp/B0GONE0001", "产品图片": ["https://x/old.jpg"]}),
            json!({"_id": "r2", "产品链接": "https://www.amazon.com/dp/B0NONE0001"}),
        ]);
        let fetcher = MockFetch::new(&[("/dp/B0NONE0001", "<html><body>nothing</body></html>")]);

        let report = FetchCommand::new(make_test_config())
            .execute_with_clients(&table, &fetcher, &ImageSink::Direct)
            .await
            .unwrap();

        assert_eq!(report.kept_original, 1);
        assert_eq!(report.failed, 1);
        // failed lookups still count as new products
        assert_eq!(report.new, 2);
        assert_eq!(report.rows[1].message.as_deref(), Some("No image found on product page"));
        assert!(table.updates().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_host_sink() {
        let table = MockTable::new(vec![json!({"_id": "r1", "产品链接": "https://www.amazon.de/dp/B0LAMP0001"})]);
        let fetcher = MockFetch::new(&[("/dp/B0LAMP0001", &page_with("71lamp"))]);

        let mut config = make_test_config();
        config.scrape.verify_images = false;
        let report = FetchCommand::new(config)
            .execute_with_clients(&table, &fetcher, &ImageSink::Host(&MockHost))
            .await
            .unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(
            table.updates()[0].1["产品图片"],
            json!(["https://img.example.com/file/71lamp._AC_SL1500_.jpg"])
        );
    }

    #[tokio::test]
    async fn test_fetch_asset_sink_single_row() {
        let table = MockTable::new(vec![
            json!({"_id": "r1", "产品链接": "https://www.amazon.com/dp/B0OTHER001"}),
            json!({"_id": "r2", "产品链接": "https://www.amazon.com/dp/B0LAMP0001"}),
        ]);
        let fetcher = MockFetch::new(&[("/dp/B0LAMP0001", &page_with("71lamp"))]);

        let report = FetchCommand::new(make_test_config())
            .row_id(Some("r2".to_string()))
            .execute_with_clients(&table, &fetcher, &ImageSink::Asset)
            .await
            .unwrap();

        assert_eq!(report.total_rows, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(*table.uploads.lock().unwrap(), vec!["71lamp._AC_SL1500_.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_retries_row_update() {
        let table = MockTable::new(vec![json!({"_id": "r1", "产品链接": "https://www.amazon.com/dp/B0LAMP0001"})]);
        table.fail_updates.store(2, Ordering::SeqCst);
        let fetcher = MockFetch::new(&[("/dp/B0LAMP0001", &page_with("71lamp"))]);

        let report = FetchCommand::new(make_test_config())
            .execute_with_clients(&table, &fetcher, &ImageSink::Direct)
            .await
            .unwrap();
        assert_eq!(report.updated, 1);

        table.fail_updates.store(3, Ordering::SeqCst);
        let report = FetchCommand::new(make_test_config())
            .execute_with_clients(&table, &fetcher, &ImageSink::Direct)
            .await
            .unwrap();
        assert_eq!(report.failed, 1);
        assert!(report.rows[0].message.as_deref().unwrap().contains("after 3 attempts"));
    }

    #[test]
    fn test_sink_kind() {
        assert_eq!(ImageSink::Direct.kind(), SinkKind::Direct);
        assert_eq!(ImageSink::Host(&MockHost).kind(), SinkKind::Host);
        assert_eq!(ImageSink::Asset.kind(), SinkKind::Asset);
    }
}
