//! Page fetching (spec §4.7): either a direct GET with a per-worker cookie
//! jar, or a POST to an external rendering service, selected by the caller
//! based on `PageOptions::use_fast_mode`. Rendering/DOM internals are out of
//! scope here — `rendering` only speaks the wire contract to that service.

use std::time::Duration;

use async_trait::async_trait;

use super::crawl_types::{CrawlEngineError, FailureKind, PageOptions};

pub mod direct;
pub mod rendering;

pub use direct::DirectFetcher;
pub use rendering::RenderingFetcher;

/// Outcome of fetching a single page, prior to link extraction.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub html: String,
}

/// Common fetch contract the worker pipeline dispatches through, regardless
/// of which backend services a given job.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, page_options: &PageOptions) -> Result<FetchedPage, CrawlEngineError>;
}

/// Selects between the rendering fetcher and the direct fetcher per job
/// (spec §4.6 step 3: "the rendering fetcher by default; the direct HTTP
/// fetcher when `pageOptions.useFastMode` is true"). PDF/DOC/DOCX routing to
/// a document extractor is out of scope (spec §1, external collaborator).
pub struct CompositeFetcher {
    default_fetcher: std::sync::Arc<dyn Fetcher>,
    fast_fetcher: std::sync::Arc<dyn Fetcher>,
}

impl CompositeFetcher {
    #[must_use]
    pub fn new(
        default_fetcher: std::sync::Arc<dyn Fetcher>,
        fast_fetcher: std::sync::Arc<dyn Fetcher>,
    ) -> Self {
        Self { default_fetcher, fast_fetcher }
    }
}

#[async_trait]
impl Fetcher for CompositeFetcher {
    async fn fetch(&self, url: &str, page_options: &PageOptions) -> Result<FetchedPage, CrawlEngineError> {
        if page_options.use_fast_mode {
            self.fast_fetcher.fetch(url, page_options).await
        } else {
            self.default_fetcher.fetch(url, page_options).await
        }
    }
}

/// Total timeout budget for a single fetch (spec §4.7: `baseTimeout + waitFor`).
#[must_use]
pub fn fetch_timeout(base_timeout: Duration, page_options: &PageOptions) -> Duration {
    base_timeout + Duration::from_millis(page_options.wait_for_ms)
}

/// Normalize a transport error message into the taxonomy the worker pipeline
/// classifies on (spec §4.7: ECONNABORTED/timeout collapse to a single
/// user-facing message, still transient).
#[must_use]
pub fn normalize_fetch_error(err: &str) -> (String, FailureKind) {
    let lower = err.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") || lower.contains("econnaborted") {
        ("Request timed out".to_string(), FailureKind::Transient)
    } else {
        (err.to_string(), FailureKind::classify_message(err))
    }
}

pub(crate) fn error_for_status(status: u16, message: String) -> CrawlEngineError {
    match FailureKind::from_status(status) {
        FailureKind::Transient => CrawlEngineError::TransientFetch(message),
        FailureKind::Permanent => CrawlEngineError::PermanentFetch(message),
    }
}

pub(crate) fn error_for_kind(kind: FailureKind, message: String) -> CrawlEngineError {
    match kind {
        FailureKind::Transient => CrawlEngineError::TransientFetch(message),
        FailureKind::Permanent => CrawlEngineError::PermanentFetch(message),
    }
}
