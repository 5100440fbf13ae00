//! HTTP client for Amazon requests using wreq for TLS fingerprint emulation.

use crate::amazon::extract::check_blocked;
use crate::amazon::models::{ImageProbe, ProductUrl};
use crate::amazon::regions::Site;
use crate::amazon::upscale::{self, CANDIDATE_SIZES};
use crate::config::ScrapeConfig;
use crate::http::{retry_async, Pacing, RetryPolicy};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, info, warn};
use wreq::Client;
use wreq_util::Emulation;

/// Bytes fetched when decoding image dimensions.
pub const PROBE_READ_LIMIT: usize = 32 * 1024;

/// Trait for Amazon page and image fetching - enables mocking for tests.
#[async_trait]
pub trait AmazonFetch: Send + Sync {
    /// Fetches a product page and returns the HTML.
    async fn product_page(&self, url: &ProductUrl) -> Result<String>;

    /// Checks that an image exists and decodes its dimensions from the
    /// first `read_limit` bytes.
    async fn probe_image(&self, url: &str, read_limit: usize) -> Result<ImageProbe>;

    /// Downloads an image.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// Amazon HTTP client with browser impersonation and anti-bot measures.
pub struct AmazonClient {
    client: Client,
    initial_delay: Pacing,
    page_retry: RetryPolicy,
    base_url: Option<String>,
}

impl AmazonClient {
    /// Creates a new Amazon client with the given configuration.
    pub fn new(config: &ScrapeConfig) -> Result<Self> {
        Self::with_base_url(config, None)
    }

    /// Creates a new Amazon client with an optional custom base URL (for testing).
    ///
    /// With a base URL set, product pages are requested from that host using
    /// the product link's path.
    pub fn with_base_url(config: &ScrapeConfig, base_url: Option<String>) -> Result<Self> {
        let mut builder = Client::builder()
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10));

        if let Some(proxy_url) = &config.proxy {
            debug!("Configuring proxy: {}", proxy_url);
            let proxy = wreq::Proxy::all(proxy_url).context("Failed to configure proxy")?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            initial_delay: Pacing::new(config.delay_ms, config.delay_jitter_ms),
            page_retry: RetryPolicy::paced(
                config.page_retries.saturating_sub(1),
                Pacing::new(config.retry_delay_ms, config.retry_jitter_ms),
            ),
            base_url,
        })
    }

    /// Returns the URL actually requested for a product link.
    fn request_url(&self, url: &ProductUrl) -> String {
        match &self.base_url {
            Some(base) => {
                let path = url::Url::parse(url.as_str()).map(|u| u.path().to_string()).unwrap_or_default();
                format!("{}{}", base.trim_end_matches('/'), path)
            }
            None => url.as_str().to_string(),
        }
    }

    /// Performs a single page GET with all anti-bot measures.
    async fn get_page(&self, url: &str, site: Site) -> Result<String> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .emulation(Emulation::Chrome131)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8")
            .header("Accept-Language", site.accept_language())
            .header("Accept-Encoding", "gzip, deflate, br")
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .header("Referer", format!("{}/", site.base_url()))
            .header("Sec-Ch-Ua", "\"Chromium\";v=\"131\", \"Not_A Brand\";v=\"24\"")
            .header("Sec-Ch-Ua-Mobile", "?0")
            .header("Sec-Ch-Ua-Platform", "\"macOS\"")
            .header("Sec-Fetch-Dest", "document")
            .header("Sec-Fetch-Mode", "navigate")
            .header("Sec-Fetch-Site", "same-origin")
            .header("Sec-Fetch-User", "?1")
            .header("Upgrade-Insecure-Requests", "1")
            .send()
            .await
            .context("Failed to send request")?;

        let status = response.status();
        debug!("Response status: {}", status);

        if status == 503 {
            warn!("Rate limited (503). Consider using a proxy or increasing delay.");
            anyhow::bail!("Rate limited by Amazon. Try increasing the delay or using a proxy.");
        }

        if !status.is_success() {
            anyhow::bail!("Request failed with status: {}", status);
        }

        let final_url = response.uri().to_string();
        if self.base_url.is_none() && !final_url.contains(site.domain()) {
            warn!(
                "Redirected to different domain: {}. Your IP may be associated with a different region.",
                final_url
            );
        }

        let html = response.text().await.context("Failed to read response body")?;
        check_blocked(&html)?;
        Ok(html)
    }
}

#[async_trait]
impl AmazonFetch for AmazonClient {
    async fn product_page(&self, url: &ProductUrl) -> Result<String> {
        let site = url.site();
        let target = self.request_url(url);
        info!("Fetching product page [{}]: {}", site.code(), url);

        self.initial_delay.wait().await;
        retry_async(&self.page_retry, "Product page", |_| self.get_page(&target, site))
            .await
            .map_err(|e| e.context(format!("Failed to fetch {} after {} attempts", url, self.page_retry.attempts())))
    }

    async fn probe_image(&self, url: &str, read_limit: usize) -> Result<ImageProbe> {
        let head = self
            .client
            .head(url)
            .emulation(Emulation::Chrome131)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .with_context(|| format!("HEAD {} failed", url))?;

        let mut probe = ImageProbe {
            status: head.status().as_u16(),
            content_length: head
                .headers()
                .get("content-length")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok()),
            ..ImageProbe::default()
        };

        if !probe.is_ok() || read_limit == 0 {
            return Ok(probe);
        }

        let response = self
            .client
            .get(url)
            .emulation(Emulation::Chrome131)
            .header("Range", format!("bytes=0-{}", read_limit - 1))
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .with_context(|| format!("Ranged GET {} failed", url))?;

        let bytes = response.bytes().await.context("Failed to read image bytes")?;
        let head_bytes = &bytes[..bytes.len().min(read_limit)];

        if let Some((w, h)) = image_dimensions(head_bytes) {
            probe.width = Some(w);
            probe.height = Some(h);
        }

        Ok(probe)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Downloading {}", url);
        let response = self
            .client
            .get(url)
            .emulation(Emulation::Chrome131)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Image download failed with status: {}", status);
        }

        Ok(response.bytes().await.context("Failed to read image body")?.to_vec())
    }
}

/// Decodes width and height from the leading bytes of an image.
pub fn image_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let reader = image::ImageReader::new(Cursor::new(bytes)).with_guessed_format().ok()?;
    match reader.into_dimensions() {
        Ok(dims) => Some(dims),
        Err(e) => {
            debug!("Could not decode image dimensions: {}", e);
            None
        }
    }
}

/// Accepts images that exist and are at least `min_size` pixels on the short edge.
pub struct ImageVerifier<'a, F: AmazonFetch + ?Sized> {
    fetcher: &'a F,
    min_size: u32,
}

impl<'a, F: AmazonFetch + ?Sized> ImageVerifier<'a, F> {
    pub fn new(fetcher: &'a F, min_size: u32) -> Self {
        Self { fetcher, min_size }
    }

    pub fn min_size(&self) -> u32 {
        self.min_size
    }

    pub async fn verify(&self, url: &str) -> bool {
        let read_limit = if self.min_size == 0 { 0 } else { PROBE_READ_LIMIT };
        let probe = match self.fetcher.probe_image(url, read_limit).await {
            Ok(probe) => probe,
            Err(e) => {
                warn!("Failed to verify image URL: {:#}", e);
                return false;
            }
        };

        if !probe.is_ok() {
            debug!("Image {} returned status {}", url, probe.status);
            return false;
        }

        if self.min_size == 0 {
            return true;
        }

        match probe.min_edge() {
            Some(edge) if edge >= self.min_size => true,
            Some(edge) => {
                debug!("Image {} too small ({}px < {}px)", url, edge, self.min_size);
                false
            }
            None => false,
        }
    }
}

/// Rewrites an extracted URL to the canonical high resolution rendition.
///
/// With a verifier, sizes are tried from `target_size` downwards and the
/// first one that verifies wins; when none does the input is returned.
/// Without one, the canonical URL at `target_size` is returned unchecked.
pub async fn optimize<F>(url: &str, target_size: u32, verifier: Option<&ImageVerifier<'_, F>>) -> String
where
    F: AmazonFetch + ?Sized,
{
    let Some((id, ext)) = upscale::image_id(url) else {
        return url.to_string();
    };

    let Some(verifier) = verifier else {
        return upscale::canonical_url(&id, &ext, target_size);
    };

    let sizes = std::iter::once(target_size).chain(CANDIDATE_SIZES.into_iter().filter(|s| *s < target_size));
    for size in sizes {
        let candidate = upscale::canonical_url(&id, &ext, size);
        if verifier.verify(&candidate).await {
            return candidate;
        }
    }

    warn!("No high resolution rendition available, keeping {}", url);
    url.to_string()
}
