//! REST client for the table service (SeaTable).

use crate::http::{retry_async_when, RetryPolicy};
use crate::table::error::{Result as TableResult, TableError};
use crate::table::models::{
    AccessToken, DownloadLink, Metadata, MetadataResponse, Row, RowsResponse, UploadLink, UploadedFile,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};
use wreq::{Client, RequestBuilder, Response};

/// Trait for table access - enables mocking for tests.
#[async_trait]
pub trait TableApi: Send + Sync {
    /// Display name of the base.
    fn base_name(&self) -> &str;

    async fn metadata(&self) -> Result<Metadata>;

    /// Lists one page of rows.
    async fn list_rows(&self, table: &str, start: usize, limit: usize) -> Result<Vec<Row>>;

    async fn get_row(&self, table: &str, row_id: &str) -> Result<Row>;

    /// Overwrites the given cells of one row.
    async fn update_row(&self, table: &str, row_id: &str, values: Map<String, Value>) -> Result<()>;

    /// Downloads a file, resolving the base's own asset URLs.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;

    /// Stores an image in the base's asset storage and returns its URL.
    async fn upload_asset(&self, bytes: Vec<u8>, file_name: &str) -> Result<String>;
}

/// Reads every row of a table, one page at a time.
pub async fn all_rows<A: TableApi + ?Sized>(api: &A, table: &str, page_size: usize) -> Result<Vec<Row>> {
    let page_size = page_size.max(1);
    let mut rows = Vec::new();
    let mut start = 0;

    loop {
        let page = api.list_rows(table, start, page_size).await?;
        let count = page.len();
        debug!("Fetched {} rows from {} (start {})", count, table, start);
        rows.extend(page);

        if count < page_size {
            break;
        }
        start += count;
    }

    info!("Loaded {} rows from table {}", rows.len(), table);
    Ok(rows)
}

/// Authenticated connection to one base.
pub struct TableClient {
    client: Client,
    server_url: String,
    api_token: String,
    token: AccessToken,
    retry: RetryPolicy,
    name: Option<String>,
}

impl TableClient {
    /// Exchanges a base API token for an access token.
    pub async fn connect(server_url: &str, api_token: &str, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        let server_url = server_url.trim_end_matches('/').to_string();
        let auth_url = format!("{}/api/v2.1/dtable/app-access-token/", server_url);

        let response = send_with_retry(&retry, "auth", || {
            client.get(&auth_url).header("Authorization", format!("Token {}", api_token))
        })
        .await
        .map_err(|e| match e {
            TableError::Status { status, body } if matches!(status, 401 | 403 | 404) => {
                TableError::Auth(format!("{} {}", status, body))
            }
            other => other,
        })?;

        let mut token: AccessToken = decode(response).await?;
        token.dtable_server = token.dtable_server.trim_end_matches('/').to_string();
        info!("Connected to base {} ({})", token.dtable_name, token.dtable_uuid);

        Ok(Self { client, server_url, api_token: api_token.to_string(), token, retry, name: None })
    }

    /// Overrides the display name reported by the API.
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn access_token(&self) -> &AccessToken {
        &self.token
    }

    fn dtable_url(&self, suffix: &str) -> String {
        format!("{}/api/v1/dtables/{}/{}", self.token.dtable_server, self.token.dtable_uuid, suffix)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("Authorization", format!("Token {}", self.token.access_token))
    }

    fn with_api_token(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header("Authorization", format!("Token {}", self.api_token))
    }

    /// Path of a URL inside this base's asset storage, if it is one.
    fn asset_path(&self, url: &str) -> Option<String> {
        let uuid = self.token.dtable_uuid.replace('-', "");
        let marker = url.find("/asset/")?;
        let rest = &url[marker + "/asset/".len()..];
        let (asset_uuid, path) = rest.split_once('/')?;
        if asset_uuid.replace('-', "") != uuid {
            return None;
        }
        let path = format!("/{}", path);
        Some(urlencoding::decode(&path).map(|p| p.into_owned()).unwrap_or(path))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = send_with_retry(&self.retry, "download", || self.client.get(url)).await?;
        Ok(response.bytes().await.context("Failed to read download body")?.to_vec())
    }
}

#[async_trait]
impl TableApi for TableClient {
    fn base_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.token.dtable_name)
    }

    async fn metadata(&self) -> Result<Metadata> {
        let url = self.dtable_url("metadata/");
        let response = send_with_retry(&self.retry, "metadata", || self.authorized(self.client.get(&url))).await?;
        let parsed: MetadataResponse = decode(response).await?;
        Ok(parsed.metadata)
    }

    async fn list_rows(&self, table: &str, start: usize, limit: usize) -> Result<Vec<Row>> {
        let url = format!(
            "{}?table_name={}&start={}&limit={}",
            self.dtable_url("rows/"),
            urlencoding::encode(table),
            start,
            limit
        );

        let response = send_with_retry(&self.retry, "list rows", || self.authorized(self.client.get(&url)))
            .await
            .map_err(|e| match e {
                TableError::Status { status: 404, .. } => TableError::MissingTable(table.to_string()),
                other => other,
            })?;

        let parsed: RowsResponse = decode(response).await?;
        Ok(parsed.rows)
    }

    async fn get_row(&self, table: &str, row_id: &str) -> Result<Row> {
        let url = format!(
            "{}?table_name={}",
            self.dtable_url(&format!("rows/{}/", urlencoding::encode(row_id))),
            urlencoding::encode(table)
        );

        let response = send_with_retry(&self.retry, "get row", || self.authorized(self.client.get(&url))).await?;
        Ok(decode(response).await?)
    }

    async fn update_row(&self, table: &str, row_id: &str, values: Map<String, Value>) -> Result<()> {
        let url = self.dtable_url("rows/");
        let body = json!({ "table_name": table, "row_id": row_id, "row": values });

        send_with_retry(&self.retry, "update row", || self.authorized(self.client.put(&url)).json(&body))
            .await
            .with_context(|| format!("Failed to update row {} in {}", row_id, table))?;

        debug!("Updated row {} in {}", row_id, table);
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let Some(path) = self.asset_path(url) else {
            return self.fetch_bytes(url).await;
        };

        let link_url = format!(
            "{}/api/v2.1/dtable/app-download-link/?path={}",
            self.server_url,
            urlencoding::encode(&path)
        );
        let response =
            send_with_retry(&self.retry, "download link", || self.with_api_token(self.client.get(&link_url))).await?;
        let link: DownloadLink = decode(response).await?;

        debug!("Resolved asset {} to download link", path);
        let bytes = self.fetch_bytes(&link.download_link).await?;
        if bytes.is_empty() {
            anyhow::bail!("Downloaded file is empty: {}", url);
        }
        Ok(bytes)
    }

    async fn upload_asset(&self, bytes: Vec<u8>, file_name: &str) -> Result<String> {
        let link_url = format!("{}/api/v2.1/dtable/app-upload-link/", self.server_url);
        let response =
            send_with_retry(&self.retry, "upload link", || self.with_api_token(self.client.get(&link_url))).await?;
        let link: UploadLink = decode(response).await?;

        let upload_url = format!("{}?ret-json=1", link.upload_link);
        let response = send_with_retry(&self.retry, "upload asset", || {
            let form = wreq::multipart::Form::new()
                .text("parent_dir", link.parent_path.clone())
                .text("relative_path", link.img_relative_path.clone())
                .text("replace", "0")
                .part("file", wreq::multipart::Part::bytes(bytes.clone()).file_name(file_name.to_string()));
            self.client.post(&upload_url).multipart(form)
        })
        .await?;

        let uploaded: Vec<UploadedFile> = decode(response).await?;
        let stored = uploaded.first().map(|f| f.name.as_str()).unwrap_or(file_name);

        let url = format!(
            "{}/workspace/{}/asset/{}/{}/{}",
            self.server_url,
            self.token.workspace_id,
            hyphenated_uuid(&self.token.dtable_uuid),
            link.img_relative_path.trim_matches('/'),
            urlencoding::encode(stored)
        );
        info!("Stored asset {}", url);
        Ok(url)
    }
}

/// Sends a request, retrying transport errors and retryable statuses.
async fn send_with_retry<F>(policy: &RetryPolicy, label: &str, build: F) -> TableResult<Response>
where
    F: Fn() -> RequestBuilder,
{
    let retryable = |e: &TableError| match e {
        TableError::Transport(_) => true,
        TableError::Status { status, .. } => policy.should_retry(*status),
        _ => false,
    };

    let build = &build;
    retry_async_when(policy, label, retryable, move |_| async move {
        let response = match build().send().await {
            Ok(response) => response,
            Err(e) => return Err(TableError::Transport(e)),
        };
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(TableError::Status { status, body: truncate(&body, 200) })
    })
    .await
}

async fn decode<T: DeserializeOwned>(response: Response) -> TableResult<T> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| TableError::Decode(format!("{} in {}", e, truncate(&body, 200))))
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max).collect::<String>())
    }
}

/// Formats a 32-digit uuid as 8-4-4-4-12; other input is returned unchanged.
fn hyphenated_uuid(uuid: &str) -> String {
    if uuid.len() != 32 || !uuid.chars().all(|c| c.is_ascii_hexdigit()) {
        return uuid.to_string();
    }
    format!("{}-{}-{}-{}-{}", &uuid[0..8], &uuid[8..12], &uuid[12..16], &uuid[16..20], &uuid[20..])
}
