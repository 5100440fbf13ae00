//! Run notifications posted to a webhook.

use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use wreq::Client;

#[derive(Debug, Serialize)]
struct Notification<'a> {
    title: &'a str,
    content: &'a str,
}

/// Posts `{title, content}` to the configured URL. Does nothing without one.
pub struct Notifier {
    client: Option<Client>,
    url: Option<String>,
}

impl Notifier {
    pub fn new(url: Option<String>) -> Self {
        let url = url.filter(|u| !u.trim().is_empty());
        let client = url.as_ref().and_then(|_| {
            Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .map_err(|e| debug!("Notification client unavailable: {}", e))
                .ok()
        });
        Self { client, url }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    async fn send(&self, title: &str, content: &str) -> Result<()> {
        let (Some(client), Some(url)) = (&self.client, &self.url) else {
            return Ok(());
        };

        let response = client
            .post(url)
            .json(&Notification { title, content })
            .send()
            .await
            .context("Failed to send notification")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Notification endpoint returned {}", status);
        }
        Ok(())
    }

    /// Sends a notification. Failures are logged and otherwise ignored.
    pub async fn notify(&self, title: &str, content: &str) {
        if let Err(e) = self.send(title, content).await {
            debug!("Notification not delivered: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_notify_posts_json() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/sendNotify"))
            .and(body_json(json!({"title": "Image relay", "content": "Relayed: 3"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = Notifier::new(Some(format!("{}/api/sendNotify", server.uri())));
        assert!(notifier.is_enabled());
        notifier.notify("Image relay", "Relayed: 3").await;
    }

    #[tokio::test]
    async fn test_notify_failure_is_ignored() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let notifier = Notifier::new(Some(server.uri()));
        notifier.notify("t", "c").await;
        assert!(notifier.send("t", "c").await.is_err());
    }

    #[tokio::test]
    async fn test_disabled_without_url() {
        let notifier = Notifier::new(Some("  ".to_string()));
        assert!(!notifier.is_enabled());
        notifier.notify("t", "c").await;
        assert!(Notifier::new(None).send("t", "c").await.is_ok());
    }
}
