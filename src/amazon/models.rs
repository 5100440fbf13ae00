//! Data models for product links and extracted images.

use crate::amazon::regions::Site;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A product page URL with tracking noise removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductUrl(String);

impl ProductUrl {
    /// Normalizes a raw link cell value.
    ///
    /// Adds an `https://` scheme when missing and strips the query string
    /// plus any `/ref=` or `/tag=` path suffix.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            anyhow::bail!("Product link is empty");
        }

        let mut url =
            if trimmed.starts_with("http") { trimmed.to_string() } else { format!("https://{trimmed}") };

        for marker in ["?", "/ref=", "/tag="] {
            if let Some(idx) = url.find(marker) {
                url.truncate(idx);
            }
        }

        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The storefront this link points at.
    pub fn site(&self) -> Site {
        Site::from_url(&self.0)
    }

    /// Key used to recognise the same product across rows.
    pub fn cache_key(&self) -> String {
        self.0.trim_end_matches('/').to_lowercase()
    }
}

impl fmt::Display for ProductUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which extraction step produced an image URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum ImageSource {
    /// Largest entry of the `data-a-dynamic-image` map.
    DynamicImage,
    /// `colorImages.initial` JSON block.
    ColorImages,
    /// One of the named regex patterns.
    Pattern(String),
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::DynamicImage => write!(f, "dynamic-image"),
            ImageSource::ColorImages => write!(f, "color-images"),
            ImageSource::Pattern(name) => write!(f, "pattern:{}", name),
        }
    }
}

/// An image URL found on a product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedImage {
    pub url: String,
    pub source: ImageSource,
    /// Declared width, when the page states one
    pub width: Option<u32>,
    /// Declared height, when the page states one
    pub height: Option<u32>,
}

impl ExtractedImage {
    pub fn new(url: impl Into<String>, source: ImageSource) -> Self {
        Self { url: url.into(), source, width: None, height: None }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    /// Declared pixel area, zero when unknown.
    pub fn area(&self) -> u64 {
        match (self.width, self.height) {
            (Some(w), Some(h)) => u64::from(w) * u64::from(h),
            _ => 0,
        }
    }
}

/// Result of probing a remote image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageProbe {
    pub status: u16,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub content_length: Option<u64>,
}

impl ImageProbe {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// The shorter edge, when dimensions were decoded.
    pub fn min_edge(&self) -> Option<u32> {
        Some(self.width?.min(self.height?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_url_strips_tracking() {
        let url = ProductUrl::parse("https://www.amazon.com/dp/B08N5WRWNW/ref=sr_1_1?keywords=mouse").unwrap();
        assert_eq!(url.as_str(), "https://www.amazon.com/dp/B08N5WRWNW");

        let url = ProductUrl::parse("https://www.amazon.de/dp/B08N5WRWNW?th=1").unwrap();
        assert_eq!(url.as_str(), "https://www.amazon.de/dp/B08N5WRWNW");

        let url = ProductUrl::parse("https://www.amazon.com/dp/B08N5WRWNW/tag=affiliate-20").unwrap();
        assert_eq!(url.as_str(), "https://www.amazon.com/dp/B08N5WRWNW");
    }

    #[test]
    fn test_product_url_adds_scheme() {
        let url = ProductUrl::parse("  www.amazon.co.uk/dp/B08N5WRWNW  ").unwrap();
        assert_eq!(url.as_str(), "https://www.amazon.co.uk/dp/B08N5WRWNW");
        assert_eq!(url.site(), Site::Uk);
    }

    #[test]
    fn test_product_url_empty() {
        assert!(ProductUrl::parse("").is_err());
        assert!(ProductUrl::parse("   ").is_err());
    }

    #[test]
    fn test_cache_key_ignores_tracking_and_case() {
        let a = ProductUrl::parse("https://www.amazon.com/dp/B08N5WRWNW/ref=abc").unwrap();
        let b = ProductUrl::parse("https://www.Amazon.com/dp/B08N5WRWNW/?tag=x").unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_extracted_image_area() {
        let img = ExtractedImage::new("https://x/a.jpg", ImageSource::DynamicImage).with_size(100, 20);
        assert_eq!(img.area(), 2000);
        assert_eq!(ExtractedImage::new("https://x/a.jpg", ImageSource::ColorImages).area(), 0);
    }

    #[test]
    fn test_image_source_display() {
        assert_eq!(ImageSource::DynamicImage.to_string(), "dynamic-image");
        assert_eq!(ImageSource::Pattern("data-old-hires".into()).to_string(), "pattern:data-old-hires");
    }

    #[test]
    fn test_probe_min_edge() {
        let probe = ImageProbe { status: 200, width: Some(1500), height: Some(1200), content_length: None };
        assert!(probe.is_ok());
        assert_eq!(probe.min_edge(), Some(1200));
        assert_eq!(ImageProbe::default().min_edge(), None);
    }
}
