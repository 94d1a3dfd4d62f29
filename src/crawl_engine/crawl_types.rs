//! Core types shared across the crawl coordinator, queue, and worker pipeline.
//!
//! This module contains the data model described by the crawl specification:
//! the persistent `StoredCrawl` record, the `Job` unit of queue work, the
//! `Document` emitted per page, and the error taxonomy the rest of the crate
//! propagates.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, globally unique identifier for a crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrawlId(pub Uuid);

impl CrawlId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CrawlId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CrawlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier for a single job in the priority work queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tenant identity carried on every crawl and job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Entitlement band for a tenant; drives the Priority Policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Plan {
    Free,
    Starter,
    Growth,
    Enterprise,
}

/// Current milliseconds since the Unix epoch, used for `StoredCrawl::created_at`.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Submission-time crawl policy. All fields optional with the defaults named
/// in the specification; regex sources are validated and compiled once here
/// rather than in the hot link-discovery path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerOptions {
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    pub max_depth: u32,
    pub max_crawled_links: usize,
    pub limit: usize,
    pub ignore_sitemap: bool,
    pub allow_external_links: bool,
    pub return_only_urls: bool,
    pub mode: CrawlMode,

    /// Compiled once at submission; never recompiled on the link-discovery
    /// hot path.
    #[serde(skip)]
    pub includes_compiled: Vec<Regex>,
    #[serde(skip)]
    pub excludes_compiled: Vec<Regex>,
}

impl Default for CrawlerOptions {
    fn default() -> Self {
        Self {
            includes: Vec::new(),
            excludes: Vec::new(),
            max_depth: 10,
            max_crawled_links: 1000,
            limit: 10_000,
            ignore_sitemap: true,
            allow_external_links: false,
            return_only_urls: false,
            mode: CrawlMode::Default,
            includes_compiled: Vec::new(),
            excludes_compiled: Vec::new(),
        }
    }
}

impl CrawlerOptions {
    /// Compile `includes`/`excludes` into regexes, failing the whole
    /// submission (spec §7 `ValidationError`) on the first bad pattern.
    pub fn compile(mut self) -> Result<Self, CrawlEngineError> {
        self.includes_compiled = self
            .includes
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| CrawlEngineError::Validation(format!("invalid include regex {p:?}: {e}")))
            })
            .collect::<Result<_, _>>()?;
        self.excludes_compiled = self
            .excludes
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| CrawlEngineError::Validation(format!("invalid exclude regex {p:?}: {e}")))
            })
            .collect::<Result<_, _>>()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrawlMode {
    Default,
    Fast,
}

/// Controls what the fetcher/extractor must produce for each page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOptions {
    pub include_markdown: bool,
    pub include_raw_html: bool,
    pub include_links: bool,
    pub only_include_tags: Vec<String>,
    pub remove_tags: Vec<String>,
    pub wait_for_ms: u64,
    pub headers: std::collections::HashMap<String, String>,
    pub parse_pdf: bool,
    pub screenshot: bool,
    pub full_page_screenshot: bool,
    pub replace_all_paths_with_absolute_paths: bool,
    pub use_fast_mode: bool,
    pub disable_js_dom: bool,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            include_markdown: true,
            include_raw_html: false,
            include_links: true,
            only_include_tags: Vec::new(),
            remove_tags: Vec::new(),
            wait_for_ms: 0,
            headers: std::collections::HashMap::new(),
            parse_pdf: true,
            screenshot: false,
            full_page_screenshot: false,
            replace_all_paths_with_absolute_paths: false,
            use_fast_mode: false,
            disable_js_dom: false,
        }
    }
}

/// The persistent record of a crawl. Immutable after `submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCrawl {
    pub id: CrawlId,
    pub origin_url: String,
    pub crawler_options: CrawlerOptions,
    pub page_options: PageOptions,
    pub tenant_id: TenantId,
    pub plan: Plan,
    pub created_at: u64,
    pub robots: Option<String>,
    /// Set by the coordinator/worker pipeline when a crawl is cancelled.
    /// Subsequent dequeues for this crawl are no-ops (spec §5).
    pub terminal: bool,
    /// Webhook endpoints to POST each emitted `Document` to (spec §6). Empty
    /// means results are only available inline via progress subscription.
    pub webhook_urls: Vec<String>,
    /// Opaque caller-supplied value echoed back on every webhook delivery.
    pub webhook_metadata: Option<serde_json::Value>,
}

/// A sitemap entry, `{loc, changefreq?, priority?, lastmod?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SitemapEntry {
    pub loc: String,
    pub changefreq: Option<String>,
    pub priority: Option<f32>,
    pub lastmod: Option<String>,
}

/// Runtime mode a job executes under. `Crawl` submissions expand into many
/// `SingleUrls` jobs; `SingleUrls` is the only mode a worker ever dequeues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobMode {
    SingleUrls,
}

/// A unit of work in the priority queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub crawl_id: CrawlId,
    pub url: String,
    pub mode: JobMode,
    pub priority: i32,
    pub sitemapped: bool,
    pub crawler_options: CrawlerOptions,
    pub page_options: PageOptions,
    pub sitemap_entry: Option<SitemapEntry>,
}

/// Page-level sitemap metadata attached to a `Document` when known.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SitemapMetadata {
    pub changefreq: Option<String>,
    pub priority: Option<f32>,
    pub lastmod: Option<String>,
}

/// Metadata attached to every emitted `Document`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source_url: String,
    pub page_status_code: Option<u16>,
    pub page_error: Option<String>,
    pub sitemap: Option<SitemapMetadata>,
}

/// Output record per fetched page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub html: Option<String>,
    pub markdown: Option<String>,
    pub metadata: DocumentMetadata,
}

/// Categorizes page failures for retry decisions (spec §4.6/§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Network reset, timeout, DNS failure, 5xx upstream.
    Transient,
    /// 4xx, malformed response, parse failure.
    Permanent,
}

impl FailureKind {
    /// Classify an HTTP status code per spec §4.6: 5xx is transient, 4xx is
    /// permanent.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        if status >= 500 {
            Self::Transient
        } else {
            Self::Permanent
        }
    }

    /// Classify a transport-level error message. Connection resets, aborts,
    /// and timeouts are transient; anything else is treated as permanent
    /// since retrying a malformed response rarely helps.
    #[must_use]
    pub fn classify_message(msg: &str) -> Self {
        let lower = msg.to_lowercase();
        if lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("econnaborted")
            || lower.contains("connection reset")
            || lower.contains("connection aborted")
            || lower.contains("connection refused")
        {
            Self::Transient
        } else {
            Self::Permanent
        }
    }
}

/// Error taxonomy from spec §7. Only `Infrastructure` escapes the worker
/// pipeline; fetch errors are captured into the emitted `Document` instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CrawlEngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("transient fetch error: {0}")]
    TransientFetch(String),

    #[error("permanent fetch error: {0}")]
    PermanentFetch(String),

    #[error("policy rejected url: {0}")]
    PolicyReject(String),

    #[error("url already locked")]
    LockContention,

    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl From<anyhow::Error> for CrawlEngineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Infrastructure(format!("{err:#}"))
    }
}

pub type CrawlEngineResult<T> = Result<T, CrawlEngineError>;
