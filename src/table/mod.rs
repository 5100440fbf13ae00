//! Table service access: authentication, rows, and asset storage.

pub mod client;
pub mod error;
pub mod models;
pub mod rich_text;

pub use client::{all_rows, TableApi, TableClient};
pub use error::TableError;
pub use models::{link_url, AccessToken, CellImage, Column, ColumnType, ImageCell, Metadata, Row, Table};
