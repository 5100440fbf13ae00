//! Data models for the table service REST API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Result of exchanging a base API token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub dtable_uuid: String,
    pub dtable_server: String,
    #[serde(default)]
    pub dtable_name: String,
    #[serde(default)]
    pub workspace_id: u64,
}

/// Base metadata: the tables and their columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl Metadata {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(rename = "_id", default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub columns: Vec<Column>,
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns holding image lists.
    pub fn image_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.column_type == ColumnType::Image)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    #[serde(default)]
    pub key: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnType {
    Image,
    File,
    Url,
    LongText,
    Text,
    #[default]
    #[serde(other)]
    Other,
}

/// A table row: its id plus the cell values keyed by column name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column).filter(|v| !v.is_null())
    }

    /// Short human label for logs: the first non-system text cell.
    pub fn label(&self) -> String {
        let text = self
            .values
            .iter()
            .filter(|(k, _)| !k.starts_with('_'))
            .find_map(|(_, v)| v.as_str().filter(|s| !s.trim().is_empty()))
            .unwrap_or("");

        if text.chars().count() > 30 {
            format!("{}...", text.chars().take(30).collect::<String>())
        } else {
            text.to_string()
        }
    }
}

/// A file stored in the table's asset storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAsset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of an image or file cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellImage {
    Url(String),
    File(FileAsset),
    /// Any other entry; written back untouched.
    Other(Value),
}

impl CellImage {
    pub fn url(&self) -> Option<&str> {
        match self {
            CellImage::Url(url) => Some(url),
            CellImage::File(file) => Some(&file.url),
            CellImage::Other(_) => None,
        }
    }

    /// Points the entry at a new URL, keeping its shape.
    pub fn set_url(&mut self, new_url: &str) {
        match self {
            CellImage::Url(url) => *url = new_url.to_string(),
            CellImage::File(file) => file.url = new_url.to_string(),
            CellImage::Other(_) => {}
        }
    }
}

/// The parsed value of an image cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageCell {
    pub images: Vec<CellImage>,
    /// The cell held a bare string rather than a list
    pub scalar: bool,
}

impl ImageCell {
    /// Parses a cell; unknown shapes yield an empty cell. Unknown entries
    /// inside a list are kept as [`CellImage::Other`].
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) if !s.trim().is_empty() => {
                Self { images: vec![CellImage::Url(s.clone())], scalar: true }
            }
            Some(Value::Array(items)) => Self {
                images: items
                    .iter()
                    .map(|v| serde_json::from_value(v.clone()).unwrap_or_else(|_| CellImage::Other(v.clone())))
                    .collect(),
                scalar: false,
            },
            _ => Self::default(),
        }
    }

    /// True when no entry carries a URL.
    pub fn is_empty(&self) -> bool {
        self.first_url().is_none()
    }

    pub fn urls(&self) -> Vec<&str> {
        self.images.iter().filter_map(CellImage::url).collect()
    }

    pub fn first_url(&self) -> Option<&str> {
        self.images.iter().find_map(CellImage::url)
    }

    /// Replaces every entry pointing at `old`; returns whether anything changed.
    pub fn replace(&mut self, old: &str, new: &str) -> bool {
        let mut changed = false;
        for image in self.images.iter_mut().filter(|i| i.url() == Some(old)) {
            image.set_url(new);
            changed = true;
        }
        changed
    }

    /// Serializes back into the shape the cell was read in.
    pub fn into_value(self) -> Value {
        if self.scalar && self.images.len() == 1 {
            if let Some(CellImage::Url(url)) = self.images.first() {
                return Value::String(url.clone());
            }
        }
        Value::Array(self.images.into_iter().filter_map(|i| serde_json::to_value(i).ok()).collect())
    }
}

/// Reads a product link from a URL, text or link-object cell.
pub fn link_url(cell: Option<&Value>) -> Option<String> {
    match cell? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Object(obj) => link_url(obj.get("url")),
        Value::Array(items) => link_url(items.first()),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetadataResponse {
    pub metadata: Metadata,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RowsResponse {
    #[serde(default)]
    pub rows: Vec<Row>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DownloadLink {
    pub download_link: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadLink {
    pub upload_link: String,
    pub parent_path: String,
    #[serde(default = "default_img_relative_path")]
    pub img_relative_path: String,
}

fn default_img_relative_path() -> String {
    "images".to_string()
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadedFile {
    pub name: String,
}
