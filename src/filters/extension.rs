//! Extension-based filtering.

use super::{file_extension, ImageFilter, SkipReason, Verdict};

pub const IMAGE_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Keeps URLs whose path ends in an allowed extension.
/// A path without extension counts as `.jpg`.
pub struct ExtensionFilter {
    allowed: Vec<String>,
}

impl ExtensionFilter {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed: allowed.into_iter().map(|e| e.to_lowercase()).collect() }
    }

    /// Common raster image formats.
    pub fn images() -> Self {
        Self::new(IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect())
    }
}

impl ImageFilter for ExtensionFilter {
    fn verdict(&self, url: &str) -> Verdict {
        let ext = file_extension(url);
        if self.allowed.iter().any(|a| *a == ext) {
            Verdict::Process
        } else {
            Verdict::Skip(SkipReason::UnsupportedExtension)
        }
    }

    fn description(&self) -> String {
        format!("Extensions: {}", self.allowed.join(" "))
    }
}
