//! Image selection with composable filters.

pub mod domain;
pub mod extension;
pub mod hosted;

use crate::config::{HostConfig, RelayConfig};

pub use domain::DomainFilter;
pub use extension::ExtensionFilter;
pub use hosted::HostedFilter;

/// Why an image is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    Empty,
    AlreadyHosted,
    IgnoredDomain,
    UnsupportedExtension,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Empty => write!(f, "empty"),
            SkipReason::AlreadyHosted => write!(f, "already hosted"),
            SkipReason::IgnoredDomain => write!(f, "ignored domain"),
            SkipReason::UnsupportedExtension => write!(f, "unsupported extension"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Process,
    Skip(SkipReason),
}

impl Verdict {
    pub fn is_process(&self) -> bool {
        matches!(self, Verdict::Process)
    }
}

/// Trait for filtering image URLs.
pub trait ImageFilter: Send + Sync {
    /// Decides whether the image should be processed.
    fn verdict(&self, url: &str) -> Verdict;

    /// Returns a description of this filter.
    fn description(&self) -> String;
}

/// A chain of filters; the first skip wins.
pub struct FilterChain {
    filters: Vec<Box<dyn ImageFilter>>,
}

impl FilterChain {
    /// Creates an empty filter chain.
    pub fn new() -> Self {
        Self { filters: Vec::new() }
    }

    /// Adds a filter to the chain.
    pub fn add(&mut self, filter: impl ImageFilter + 'static) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Runs every filter in order. Blank URLs are always skipped.
    pub fn verdict(&self, url: &str) -> Verdict {
        if url.trim().is_empty() {
            return Verdict::Skip(SkipReason::Empty);
        }
        self.filters
            .iter()
            .map(|f| f.verdict(url))
            .find(|v| !v.is_process())
            .unwrap_or(Verdict::Process)
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns descriptions of all filters.
    pub fn descriptions(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.description()).collect()
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for constructing a FilterChain from configuration.
pub struct FilterChainBuilder {
    chain: FilterChain,
}

impl FilterChainBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self { chain: FilterChain::new() }
    }

    /// Skips URLs already on the image host.
    pub fn hosted_marker(mut self, marker: &str) -> Self {
        if !marker.is_empty() {
            self.chain.add(HostedFilter::new(marker));
        }
        self
    }

    /// Keeps only URLs served from these hosts.
    pub fn process_domains(mut self, domains: &[String]) -> Self {
        if !domains.is_empty() {
            self.chain.add(DomainFilter::new(domains.to_vec()));
        }
        self
    }

    /// Keeps only known image extensions.
    pub fn image_extensions(mut self, enabled: bool) -> Self {
        if enabled {
            self.chain.add(ExtensionFilter::images());
        }
        self
    }

    /// Assembles the relay chain: hosted, then domain, then extension.
    pub fn from_config(relay: &RelayConfig, host: &HostConfig) -> Self {
        Self::new()
            .hosted_marker(&host.hosted_marker)
            .process_domains(&relay.process_domains)
            .image_extensions(relay.require_image_extension)
    }

    /// Builds the filter chain.
    pub fn build(self) -> FilterChain {
        self.chain
    }
}

impl Default for FilterChainBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn url_path(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or("").to_string(),
    }
}

/// Lowercase extension of the URL path, with the dot; `.jpg` when missing.
pub fn file_extension(url: &str) -> String {
    let path = url_path(url);
    let last = path.rsplit('/').next().unwrap_or("");
    match last.rfind('.') {
        Some(idx) if idx + 1 < last.len() => last[idx..].to_lowercase(),
        _ => ".jpg".to_string(),
    }
}

/// Decoded last path segment, given an extension when it has none.
pub fn file_name(url: &str) -> String {
    let path = url_path(url);
    let last = path.rsplit('/').next().unwrap_or("");
    let decoded = urlencoding::decode(last).map(|s| s.into_owned()).unwrap_or_else(|_| last.to_string());

    if decoded.is_empty() {
        "image.jpg".to_string()
    } else if decoded.contains('.') {
        decoded
    } else {
        format!("{}.jpg", decoded)
    }
}
