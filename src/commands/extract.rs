//! Shows what image a single product link resolves to.

use crate::amazon::{optimize, AmazonClient, AmazonFetch, ExtractOptions, Extractor, ImageVerifier, ProductUrl};
use crate::config::Config;
use crate::format::{ExtractSummary, Formatter};
use anyhow::{Context, Result};
use tracing::info;

/// Executes the `extract` workflow: fetch, extract, optimize; no table writes.
pub struct ExtractCommand {
    config: Config,
}

impl ExtractCommand {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Fetches the product page and returns formatted output.
    pub async fn execute(&self, url: &str) -> Result<String> {
        let client = AmazonClient::new(&self.config.scrape).context("Failed to create HTTP client")?;
        let summary = self.execute_with_client(&client, url).await?;
        Ok(Formatter::new(self.config.format).format_extract(&summary))
    }

    /// Runs the extraction with a provided client (for testing).
    pub async fn execute_with_client<F: AmazonFetch + ?Sized>(&self, client: &F, url: &str) -> Result<ExtractSummary> {
        let product = ProductUrl::parse(url)?;
        let site = product.site();
        info!("Extracting image for {} ({})", product.as_str(), site.domain());

        let scrape = &self.config.scrape;
        let html = client.product_page(&product).await?;
        let extractor = Extractor::new(ExtractOptions { target_size: scrape.target_size });
        let candidates = extractor.candidates(&html);

        let verifier = ImageVerifier::new(client, scrape.min_image_size);
        let verifier = scrape.verify_images.then_some(&verifier);
        let selected = extractor.select(&html, verifier).await?;

        let optimized = match &selected {
            Some(image) => Some(optimize(&image.url, scrape.target_size, verifier).await),
            None => None,
        };

        Ok(ExtractSummary {
            url: product.as_str().to_string(),
            site,
            candidates,
            selected: selected.map(|image| image.url),
            optimized,
        })
    }
}
