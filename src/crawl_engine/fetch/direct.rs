//! Direct fetch: a GET request through a per-worker cookie-jar-enabled
//! `reqwest::Client` (spec §4.7).

use std::time::Duration;

use async_trait::async_trait;

use super::{error_for_kind, error_for_status, fetch_timeout, normalize_fetch_error, FetchedPage, Fetcher};
use crate::crawl_engine::crawl_types::{CrawlEngineError, PageOptions};

const DEFAULT_BASE_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "crawl-engine";

/// Fetches pages directly over HTTP(S). Each worker owns one `DirectFetcher`
/// so its cookie jar persists across pages on the same domain within a
/// crawl.
pub struct DirectFetcher {
    client: reqwest::Client,
    base_timeout: Duration,
}

impl Default for DirectFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_TIMEOUT)
    }
}

impl DirectFetcher {
    #[must_use]
    pub fn new(base_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, base_timeout }
    }
}

#[async_trait]
impl Fetcher for DirectFetcher {
    async fn fetch(
        &self,
        url: &str,
        page_options: &PageOptions,
    ) -> Result<FetchedPage, CrawlEngineError> {
        let timeout = fetch_timeout(self.base_timeout, page_options);
        let mut request = self.client.get(url);
        for (key, value) in &page_options.headers {
            request = request.header(key, value);
        }

        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| CrawlEngineError::TransientFetch("Request timed out".to_string()))?
            .map_err(|e| {
                let (message, kind) = normalize_fetch_error(&e.to_string());
                error_for_kind(kind, message)
            })?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(error_for_status(status, format!("upstream returned status {status}")));
        }

        let html = response
            .text()
            .await
            .map_err(|e| CrawlEngineError::PermanentFetch(e.to_string()))?;

        Ok(FetchedPage { status, html })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetches_successful_page() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/a")
            .with_status(200)
            .with_body("<html>hi</html>")
            .create_async()
            .await;

        let fetcher = DirectFetcher::default();
        let url = format!("{}/a", server.url());
        let page = fetcher.fetch(&url, &PageOptions::default()).await.unwrap();
        assert_eq!(page.status, 200);
        assert!(page.html.contains("hi"));
    }

    #[tokio::test]
    async fn maps_5xx_to_transient_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/a").with_status(503).create_async().await;

        let fetcher = DirectFetcher::default();
        let url = format!("{}/a", server.url());
        let err = fetcher.fetch(&url, &PageOptions::default()).await.unwrap_err();
        assert!(matches!(err, CrawlEngineError::TransientFetch(_)));
    }

    #[tokio::test]
    async fn maps_4xx_to_permanent_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/a").with_status(404).create_async().await;

        let fetcher = DirectFetcher::default();
        let url = format!("{}/a", server.url());
        let err = fetcher.fetch(&url, &PageOptions::default()).await.unwrap_err();
        assert!(matches!(err, CrawlEngineError::PermanentFetch(_)));
    }
}
