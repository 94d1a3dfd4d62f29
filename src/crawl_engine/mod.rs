//! Crawl coordination, priority work queue, and the recursive link-discovery
//! state machine: the three subsystems this crate implements.

pub mod circuit_breaker;
pub mod coordinator;
pub mod crawl_types;
pub mod crawler;
pub mod domain_limiter;
pub mod fetch;
pub mod kv;
pub mod path_rewrite;
pub mod priority;
pub mod progress;
pub mod queue;
pub mod rate_limiter;
pub mod retry_queue;
pub mod sitemap_client;
pub mod url_policy;
pub mod webhook;
pub mod worker;

pub use circuit_breaker::{extract_domain, CircuitBreaker, CircuitState, DomainHealth};
pub use coordinator::Coordinator;
pub use crawl_types::{
    CrawlEngineError, CrawlEngineResult, CrawlId, CrawlMode, CrawlerOptions, Document,
    DocumentMetadata, FailureKind, Job, JobId, JobMode, PageOptions, Plan, SitemapEntry,
    StoredCrawl, TenantId,
};
pub use domain_limiter::DomainLimiter;
pub use fetch::CompositeFetcher;
pub use kv::{InMemoryKvStore, KvStore};
pub use path_rewrite::rewrite_paths_absolute;
pub use priority::PriorityPolicy;
pub use progress::{CrawlProgressUpdate, ProgressAggregator};
pub use queue::{InMemoryJobQueue, JobQueue, JobStatus};
pub use rate_limiter::{CrawlRateLimiter, RateLimitDecision};
pub use retry_queue::RetryQueue;
pub use sitemap_client::{HttpSitemapClient, SitemapClient};
pub use url_policy::is_valid_seed_url;
pub use webhook::{HttpWebhookSender, WebhookPayload, WebhookSender};
pub use worker::{run as run_worker, WorkerContext};
