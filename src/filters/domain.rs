//! Host-based filtering.

use super::{ImageFilter, SkipReason, Verdict};

/// Keeps images whose host contains one of the configured domains.
pub struct DomainFilter {
    domains: Vec<String>,
}

impl DomainFilter {
    pub fn new(domains: Vec<String>) -> Self {
        Self {
            domains: domains.into_iter().map(|d| d.trim().to_lowercase()).filter(|d| !d.is_empty()).collect(),
        }
    }
}

impl ImageFilter for DomainFilter {
    fn verdict(&self, url: &str) -> Verdict {
        let host = match url::Url::parse(url) {
            Ok(parsed) => parsed.host_str().unwrap_or("").to_lowercase(),
            Err(_) => return Verdict::Skip(SkipReason::IgnoredDomain),
        };

        if self.domains.iter().any(|d| host.contains(d.as_str())) {
            Verdict::Process
        } else {
            Verdict::Skip(SkipReason::IgnoredDomain)
        }
    }

    fn description(&self) -> String {
        format!("Domains: {}", self.domains.join(", "))
    }
}
