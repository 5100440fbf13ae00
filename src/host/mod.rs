//! Image host relay: uploads images to a third-party host.

pub mod client;

pub use client::HostClient;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("upload rejected: {0}")]
    Rejected(String),

    #[error("upload failed with status {0}")]
    Status(u16),

    #[error("unexpected upload response: {0}")]
    Decode(String),
}

/// Trait for image hosting - enables mocking for tests.
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Uploads an image and returns its hosted URL.
    async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> Result<String>;

    /// Returns true if the URL already points at this host.
    fn is_hosted(&self, url: &str) -> bool;
}
