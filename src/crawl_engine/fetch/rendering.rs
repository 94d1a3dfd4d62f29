//! Rendering-service fetch: POST the page request to an external rendering
//! backend and parse its JSON response (spec §4.7). The rendering backend's
//! internals (headless browser, DOM extraction) are out of scope for this
//! crate; this module only speaks the wire contract to it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{error_for_kind, error_for_status, fetch_timeout, normalize_fetch_error, FetchedPage, Fetcher};
use crate::crawl_engine::crawl_types::{CrawlEngineError, PageOptions};

const DEFAULT_BASE_TIMEOUT: Duration = Duration::from_secs(60);

/// Wire shape this crate POSTs to the rendering service (spec §4.7/§6):
/// `{url, wait_after_load, headers}`.
#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
    wait_after_load: u64,
    headers: &'a std::collections::HashMap<String, String>,
}

/// Wire shape the rendering service responds with (spec §4.7/§6):
/// `{content, pageStatusCode, pageError}`. `content` carries the rendered
/// page's HTML; `pageStatusCode`/`pageError` describe the *fetched page's*
/// outcome, independent of this call's own HTTP status.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderResponse {
    content: String,
    page_status_code: Option<u16>,
    page_error: Option<String>,
}

/// Dispatches page fetches to an external rendering service over HTTP.
pub struct RenderingFetcher {
    client: reqwest::Client,
    endpoint: String,
    base_timeout: Duration,
}

impl RenderingFetcher {
    #[must_use]
    pub fn new(endpoint: String) -> Self {
        Self::with_timeout(endpoint, DEFAULT_BASE_TIMEOUT)
    }

    #[must_use]
    pub fn with_timeout(endpoint: String, base_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            base_timeout,
        }
    }
}

#[async_trait]
impl Fetcher for RenderingFetcher {
    async fn fetch(
        &self,
        url: &str,
        page_options: &PageOptions,
    ) -> Result<FetchedPage, CrawlEngineError> {
        let timeout = fetch_timeout(self.base_timeout, page_options);
        let body = RenderRequest {
            url,
            wait_after_load: page_options.wait_for_ms,
            headers: &page_options.headers,
        };

        let response = tokio::time::timeout(
            timeout,
            self.client.post(&self.endpoint).json(&body).send(),
        )
        .await
        .map_err(|_| CrawlEngineError::TransientFetch("Request timed out".to_string()))?
        .map_err(|e| {
            let (message, kind) = normalize_fetch_error(&e.to_string());
            error_for_kind(kind, message)
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(error_for_status(status, format!("rendering service returned status {status}")));
        }

        let parsed: RenderResponse = response
            .json()
            .await
            .map_err(|e| CrawlEngineError::PermanentFetch(format!("malformed rendering response: {e}")))?;

        if let Some(page_error) = parsed.page_error {
            return Err(error_for_status(
                parsed.page_status_code.unwrap_or(502),
                page_error,
            ));
        }

        Ok(FetchedPage {
            status: parsed.page_status_code.unwrap_or(200),
            html: parsed.content,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_successful_render_response() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/render")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content":"<html>rendered</html>","pageStatusCode":200,"pageError":null}"#)
            .create_async()
            .await;

        let fetcher = RenderingFetcher::new(format!("{}/render", server.url()));
        let page = fetcher
            .fetch("https://example.com/a", &PageOptions::default())
            .await
            .unwrap();
        assert_eq!(page.status, 200);
        assert!(page.html.contains("rendered"));
    }

    #[tokio::test]
    async fn page_error_in_200_response_surfaces_as_fetch_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/render")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"content":"","pageStatusCode":404,"pageError":"not found"}"#)
            .create_async()
            .await;

        let fetcher = RenderingFetcher::new(format!("{}/render", server.url()));
        let err = fetcher
            .fetch("https://example.com/a", &PageOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlEngineError::PermanentFetch(_)));
    }

    #[tokio::test]
    async fn malformed_json_is_permanent_failure() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/render")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let fetcher = RenderingFetcher::new(format!("{}/render", server.url()));
        let err = fetcher
            .fetch("https://example.com/a", &PageOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlEngineError::PermanentFetch(_)));
    }
}
