//! Amazon-specific modules for fetching product pages and extracting images.

pub mod client;
pub mod extract;
pub mod models;
pub mod patterns;
pub mod regions;
pub mod upscale;

pub use client::{optimize, AmazonClient, AmazonFetch, ImageVerifier};
pub use extract::{check_blocked, ExtractOptions, Extractor};
pub use models::{ExtractedImage, ImageProbe, ImageSource, ProductUrl};
pub use regions::Site;
