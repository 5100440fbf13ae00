//! Product image extraction from raw product page HTML.
//!
//! Extraction runs in three stages, in priority order:
//! 1. the `data-a-dynamic-image` map (largest declared area wins)
//! 2. the `colorImages.initial` gallery block
//! 3. the named regex table in [`patterns`](crate::amazon::patterns)

use crate::amazon::client::{AmazonFetch, ImageVerifier};
use crate::amazon::models::{ExtractedImage, ImageSource};
use crate::amazon::patterns::{errors, COLOR_IMAGES, DYNAMIC_IMAGE, IMAGE_PATTERNS};
use crate::amazon::upscale::{self, DEFAULT_SIZE};
use anyhow::Result;
use scraper::Html;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

/// Extraction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Edge length requested when rewriting size tokens.
    pub target_size: u32,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { target_size: DEFAULT_SIZE }
    }
}

/// Fails when the page is an anti-bot or error page instead of a product.
pub fn check_blocked(html: &str) -> Result<()> {
    let document = Html::parse_document(html);

    if document.select(&errors::CAPTCHA).next().is_some() {
        anyhow::bail!(
            "CAPTCHA detected. Amazon is blocking requests. \
            Try using a proxy or waiting before retrying."
        );
    }

    let robot_check = document
        .select(&errors::TITLE)
        .next()
        .is_some_and(|t| t.text().collect::<String>().contains("Robot Check"));
    if robot_check {
        anyhow::bail!("Robot Check page served. Try using a proxy or increasing the delay.");
    }

    if document.select(&errors::DOG_PAGE).next().is_some() {
        anyhow::bail!(
            "Amazon error page detected (503). \
            The service may be temporarily unavailable."
        );
    }

    Ok(())
}

/// Finds the main product image on a product page.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(options: ExtractOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> ExtractOptions {
        self.options
    }

    /// All usable image candidates in priority order, without duplicates.
    pub fn candidates(&self, html: &str) -> Vec<ExtractedImage> {
        let mut found = Vec::new();

        if let Some(image) = self.dynamic_image(html) {
            found.push(image);
        }
        found.extend(self.color_images(html));
        found.extend(self.pattern_matches(html));

        let mut seen = HashSet::new();
        found.retain(|image| seen.insert(image.url.clone()));

        debug!("Found {} image candidates", found.len());
        found
    }

    /// Returns the best candidate without touching the network.
    pub fn extract(&self, html: &str) -> Result<Option<ExtractedImage>> {
        check_blocked(html)?;
        Ok(self.candidates(html).into_iter().next())
    }

    /// Returns the first candidate the verifier accepts.
    ///
    /// The dynamic image map declares real dimensions and is trusted as is;
    /// every other candidate must pass the verifier when one is given.
    pub async fn select<F>(&self, html: &str, verifier: Option<&ImageVerifier<'_, F>>) -> Result<Option<ExtractedImage>>
    where
        F: AmazonFetch + ?Sized,
    {
        check_blocked(html)?;

        let Some(verifier) = verifier else {
            return Ok(self.candidates(html).into_iter().next());
        };

        for candidate in self.candidates(html) {
            if candidate.source == ImageSource::DynamicImage || verifier.verify(&candidate.url).await {
                return Ok(Some(candidate));
            }
            warn!("Image URL rejected: {}", candidate.url);
        }

        Ok(None)
    }

    /// Largest entry of the `data-a-dynamic-image` JSON map.
    fn dynamic_image(&self, html: &str) -> Option<ExtractedImage> {
        let caps = DYNAMIC_IMAGE.captures(html)?;
        let raw = caps[1].replace("&quot;", "\"");

        let map: HashMap<String, (u32, u32)> = match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!("Failed to parse dynamic image data: {}", e);
                return None;
            }
        };

        map.into_iter()
            .map(|(url, (w, h))| ExtractedImage::new(url, ImageSource::DynamicImage).with_size(w, h))
            .max_by(|a, b| a.area().cmp(&b.area()).then_with(|| b.url.cmp(&a.url)))
    }

    /// `hiRes` then `large` of every `colorImages.initial` entry.
    fn color_images(&self, html: &str) -> Vec<ExtractedImage> {
        let Some(start) = COLOR_IMAGES.find(html) else {
            return Vec::new();
        };

        // The stream stops at the array's closing bracket; the script continues after it.
        let mut stream = serde_json::Deserializer::from_str(&html[start.end()..]).into_iter::<Vec<Value>>();
        let entries = match stream.next() {
            Some(Ok(entries)) => entries,
            Some(Err(e)) => {
                warn!("Failed to parse colorImages data: {}", e);
                return Vec::new();
            }
            None => return Vec::new(),
        };

        entries
            .iter()
            .flat_map(|entry| ["hiRes", "large"].map(|key| entry.get(key).and_then(Value::as_str)))
            .flatten()
            .filter(|url| url.starts_with("http"))
            .map(|url| ExtractedImage::new(upscale::clean(url), ImageSource::ColorImages))
            .collect()
    }

    fn pattern_matches(&self, html: &str) -> Vec<ExtractedImage> {
        let mut found = Vec::new();

        for pattern in IMAGE_PATTERNS.iter() {
            for caps in pattern.regex.captures_iter(html) {
                let url = caps[1].replace('\\', "").replace("&amp;", "&");
                if !url.starts_with("http") {
                    trace!("Skipping non-http match from {}: {}", pattern.name, url);
                    continue;
                }

                let url = upscale::upscale(&url, self.options.target_size);
                if upscale::is_placeholder(&url) {
                    trace!("Skipping placeholder from {}: {}", pattern.name, url);
                    continue;
                }

                found.push(ExtractedImage::new(url, ImageSource::Pattern(pattern.name.to_string())));
            }
        }

        found
    }
}
