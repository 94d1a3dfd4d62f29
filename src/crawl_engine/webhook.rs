//! Webhook delivery: POST one notification per emitted document, at-least-
//! once with bounded exponential backoff (spec §6).
//!
//! A crawl's `webhook_urls` (spec §3 `StoredCrawl`) are independent of this
//! sender's lifetime, so the endpoint is passed per delivery rather than
//! fixed at construction — one `HttpWebhookSender` instance serves every
//! crawl the worker pool processes.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::crawl_types::{CrawlEngineError, CrawlId, Document, DocumentMetadata, JobId};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Wire shape POSTed to each configured webhook URL (spec §6):
/// `{ crawlId, jobId, url, metadata, content, html?, markdown?, webhookMetadata }`.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub crawl_id: String,
    pub job_id: String,
    pub url: String,
    pub metadata: DocumentMetadata,
    pub content: String,
    pub html: Option<String>,
    pub markdown: Option<String>,
    pub webhook_metadata: Option<Value>,
}

impl WebhookPayload {
    #[must_use]
    pub fn from_document(
        crawl_id: CrawlId,
        job_id: JobId,
        document: &Document,
        webhook_metadata: Option<Value>,
    ) -> Self {
        Self {
            crawl_id: crawl_id.to_string(),
            job_id: job_id.to_string(),
            url: document.metadata.source_url.clone(),
            metadata: document.metadata.clone(),
            content: document.content.clone(),
            html: document.html.clone(),
            markdown: document.markdown.clone(),
            webhook_metadata,
        }
    }
}

#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn deliver(&self, endpoint: &str, payload: &WebhookPayload);
}

/// `reqwest`-backed webhook delivery. At-least-once: failures retry up to
/// `max_attempts` times with exponential backoff, then are logged and
/// abandoned rather than blocking the worker pipeline indefinitely.
pub struct HttpWebhookSender {
    client: reqwest::Client,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl Default for HttpWebhookSender {
    fn default() -> Self {
        Self::with_backoff(DEFAULT_MAX_ATTEMPTS, DEFAULT_INITIAL_BACKOFF)
    }
}

impl HttpWebhookSender {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_backoff(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_attempts,
            initial_backoff,
        }
    }

    async fn attempt(&self, endpoint: &str, payload: &WebhookPayload) -> Result<(), CrawlEngineError> {
        let response = self
            .client
            .post(endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| CrawlEngineError::Infrastructure(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(CrawlEngineError::Infrastructure(format!(
                "webhook endpoint returned {}",
                response.status()
            )))
        }
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn deliver(&self, endpoint: &str, payload: &WebhookPayload) {
        let mut backoff = self.initial_backoff;
        for attempt in 1..=self.max_attempts {
            match self.attempt(endpoint, payload).await {
                Ok(()) => return,
                Err(err) => {
                    log::warn!(
                        "webhook delivery attempt {attempt}/{} to {endpoint} failed: {err}",
                        self.max_attempts
                    );
                    if attempt == self.max_attempts {
                        log::error!(
                            "webhook delivery abandoned for crawl {} after {} attempts",
                            payload.crawl_id,
                            self.max_attempts
                        );
                        return;
                    }
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl_engine::crawl_types::DocumentMetadata;

    fn doc() -> Document {
        Document {
            content: "hi".into(),
            html: None,
            markdown: None,
            metadata: DocumentMetadata {
                source_url: "https://example.com/a".into(),
                page_status_code: Some(200),
                page_error: None,
                sitemap: None,
            },
        }
    }

    fn payload() -> WebhookPayload {
        WebhookPayload::from_document(CrawlId::new(), JobId::new(), &doc(), None)
    }

    #[tokio::test]
    async fn delivers_on_first_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/hook").with_status(200).create_async().await;
        let sender = HttpWebhookSender::new();
        sender.deliver(&format!("{}/hook", server.url()), &payload()).await;
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retries_then_gives_up_after_max_attempts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;
        let sender = HttpWebhookSender::with_backoff(3, Duration::from_millis(1));
        sender.deliver(&format!("{}/hook", server.url()), &payload()).await;
        mock.assert_async().await;
    }
}
