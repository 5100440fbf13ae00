//! seatable-image-sync - keeps the product images in SeaTable bases current
//!
//! Fills image columns from the Amazon product page linked in each row, and
//! relays images stored in SeaTable to an external image host.

pub mod amazon;
pub mod commands;
pub mod config;
pub mod filters;
pub mod format;
pub mod history;
pub mod host;
pub mod http;
pub mod logging;
pub mod notify;
pub mod progress;
pub mod table;

pub use amazon::{ExtractedImage, ProductUrl, Site};
pub use config::Config;
