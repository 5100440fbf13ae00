//! Multipart upload client for the image host.

use crate::config::HostConfig;
use crate::filters::file_extension;
use crate::host::{HostError, ImageHost};
use crate::http::{retry_async, Pacing, RetryPolicy};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};
use wreq::multipart::{Form, Part};
use wreq::Client;

pub struct HostClient {
    client: Client,
    upload_api: String,
    hosted_marker: String,
    size_limit: u64,
    retry: RetryPolicy,
}

impl HostClient {
    pub fn new(config: &HostConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            upload_api: config.upload_api.clone(),
            hosted_marker: config.hosted_marker.clone(),
            size_limit: config.size_limit_bytes(),
            retry: RetryPolicy::paced(config.max_retries.saturating_sub(1), Pacing::new(1000, 0)),
        })
    }

    /// Sets the pause between failed attempts.
    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry = RetryPolicy::paced(self.retry.max_retries, Pacing::new(pause.as_millis() as u64, 0));
        self
    }

    async fn upload_once(&self, bytes: &[u8], file_name: &str) -> Result<String> {
        let part = Part::bytes(bytes.to_vec()).file_name(file_name.to_string()).mime_str(mime_type(file_name))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.upload_api)
            .multipart(form)
            .send()
            .await
            .context("Failed to send upload")?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(HostError::Status(status).into());
        }

        let body: Value = response.json().await.map_err(|e| HostError::Decode(e.to_string()))?;
        Ok(hosted_url(&body, &self.upload_api)?)
    }
}

#[async_trait]
impl ImageHost for HostClient {
    async fn upload(&self, bytes: Vec<u8>, file_name: &str) -> Result<String> {
        let size = bytes.len() as u64;
        if size > self.size_limit {
            return Err(HostError::TooLarge { size, limit: self.size_limit }.into());
        }

        info!("Uploading {} ({}) to {}", file_name, format_size(size), self.upload_api);

        let bytes = &bytes;
        let url = retry_async(&self.retry, "Upload", move |_| self.upload_once(bytes, file_name)).await?;
        info!("Upload succeeded: {}", url);
        Ok(url)
    }

    fn is_hosted(&self, url: &str) -> bool {
        !self.hosted_marker.is_empty() && url.contains(&self.hosted_marker)
    }
}

/// Reads the hosted URL out of an upload response.
///
/// Accepts `{"url": ..}`, `{"data": {"url": ..}}` and Telegraph-style
/// `[{"src": "/file/.."}]`, where relative paths resolve against the API.
pub fn hosted_url(body: &Value, upload_api: &str) -> std::result::Result<String, HostError> {
    let direct = body
        .get("url")
        .or_else(|| body.get("data").and_then(|d| d.get("url")))
        .and_then(Value::as_str);
    if let Some(url) = direct {
        return Ok(url.to_string());
    }

    if let Some(src) = body.get(0).and_then(|f| f.get("src")).and_then(Value::as_str) {
        if src.starts_with("http") {
            return Ok(src.to_string());
        }
        let joined = url::Url::parse(upload_api).and_then(|base| base.join(src));
        return joined.map(String::from).map_err(|e| HostError::Decode(e.to_string()));
    }

    let message = body
        .get("message")
        .or_else(|| body.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    debug!("Upload response without URL: {}", body);
    Err(HostError::Rejected(message.to_string()))
}

fn mime_type(file_name: &str) -> &'static str {
    match file_extension(file_name).as_str() {
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        _ => "image/jpeg",
    }
}

/// Human readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_client(server: &MockServer) -> HostClient {
        let config = HostConfig {
            upload_api: format!("{}/api/tgchannel", server.uri()),
            size_limit_mb: 1,
            max_retries: 2,
            ..HostConfig::default()
        };
        HostClient::new(&config).unwrap().with_retry_pause(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_upload_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/tgchannel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"url": "https://img.shuang.fun/file/abc.jpg"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = make_client(&server);
        let url = client.upload(vec![0u8; 128], "a.jpg").await.unwrap();
        assert_eq!(url, "https://img.shuang.fun/file/abc.jpg");
        assert!(client.is_hosted(&url));
    }

    #[tokio::test]
    async fn test_upload_rejected_after_retries() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "quota exceeded"})))
            .expect(2)
            .mount(&server)
            .await;

        let err = make_client(&server).upload(vec![1], "a.png").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<HostError>(), Some(HostError::Rejected(m)) if m == "quota exceeded"));
    }

    #[tokio::test]
    async fn test_upload_status_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = make_client(&server).upload(vec![1], "a.png").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<HostError>(), Some(HostError::Status(500))));
    }

    #[tokio::test]
    async fn test_upload_too_large_skips_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = make_client(&server).upload(vec![0u8; 1024 * 1024 + 1], "big.jpg").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<HostError>(), Some(HostError::TooLarge { limit: 1048576, .. })));
    }

    #[test]
    fn test_hosted_url_shapes() {
        let api = "https://img.example.com/upload";
        assert_eq!(hosted_url(&json!({"url": "https://h/a.jpg"}), api).unwrap(), "https://h/a.jpg");
        assert_eq!(hosted_url(&json!({"data": {"url": "https://h/b.jpg"}}), api).unwrap(), "https://h/b.jpg");
        assert_eq!(hosted_url(&json!([{"src": "/file/c.jpg"}]), api).unwrap(), "https://img.example.com/file/c.jpg");

        let err = hosted_url(&json!({"ok": false}), api).unwrap_err();
        assert_eq!(err.to_string(), "upload rejected: unknown error");
    }

    #[test]
    fn test_is_hosted_empty_marker() {
        let config = HostConfig { hosted_marker: String::new(), ..HostConfig::default() };
        let client = HostClient::new(&config).unwrap();
        assert!(!client.is_hosted("https://anything/a.jpg"));
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }
}
