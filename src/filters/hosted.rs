//! Skips images already on the image host.

use super::{ImageFilter, SkipReason, Verdict};

pub struct HostedFilter {
    marker: String,
}

impl HostedFilter {
    pub fn new(marker: impl Into<String>) -> Self {
        Self { marker: marker.into() }
    }
}

impl ImageFilter for HostedFilter {
    fn verdict(&self, url: &str) -> Verdict {
        if !self.marker.is_empty() && url.contains(&self.marker) {
            Verdict::Skip(SkipReason::AlreadyHosted)
        } else {
            Verdict::Process
        }
    }

    fn description(&self) -> String {
        format!("Not hosted on {}", self.marker)
    }
}
