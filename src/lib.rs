//! Distributed crawl coordination engine: a crawl coordinator, a
//! priority-ordered work queue, and a link-discovery crawler state machine.
//!
//! [`config`] holds the typed, builder-constructed engine configuration;
//! [`crawl_engine`] holds the coordinator, queue, worker pipeline, and their
//! supporting adapters (KV store, fetchers, sitemap/robots client, rate
//! limiter, circuit breaker, webhook sender).

pub mod config;
pub mod crawl_engine;

pub use config::{EngineConfig, EngineConfigBuilder, FetchMode};
pub use crawl_engine::{
    CircuitBreaker, CircuitState, CompositeFetcher, Coordinator, CrawlEngineError,
    CrawlEngineResult, CrawlId, CrawlMode, CrawlRateLimiter, CrawlerOptions, Document,
    DocumentMetadata, DomainLimiter,
    FailureKind, HttpSitemapClient, HttpWebhookSender, InMemoryJobQueue, InMemoryKvStore, Job,
    JobId, JobMode, JobQueue, JobStatus, KvStore, PageOptions, Plan, PriorityPolicy,
    ProgressAggregator, RateLimitDecision, RetryQueue, SitemapClient, SitemapEntry, StoredCrawl,
    TenantId, WebhookPayload, WebhookSender, WorkerContext,
};

use std::sync::Arc;

use crawl_engine::fetch::{direct::DirectFetcher, rendering::RenderingFetcher, Fetcher};

/// Wires a coordinator plus its worker pool from an [`EngineConfig`],
/// entirely in-memory (an [`InMemoryKvStore`] and [`InMemoryJobQueue`]).
/// Suitable for local operation and the dev binary; a production deployment
/// swaps in durable `KvStore`/`JobQueue` implementations and calls
/// [`Coordinator::new`] directly instead.
///
/// Spawns `config.worker_count()` worker tasks and returns the shared
/// [`Coordinator`] handle used to submit, track, and cancel crawls.
#[must_use]
pub fn spawn_engine(config: &EngineConfig) -> Arc<Coordinator> {
    let kv: Arc<dyn KvStore> = InMemoryKvStore::new();
    let queue: Arc<dyn JobQueue> = InMemoryJobQueue::new();
    let sitemap_client: Arc<dyn SitemapClient> = Arc::new(HttpSitemapClient::new());
    let priority_policy = PriorityPolicy::new();

    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&kv),
        Arc::clone(&queue),
        Arc::clone(&sitemap_client),
        Arc::clone(&priority_policy),
    ));

    // Per spec §4.6 step 3, a job's fetcher is chosen by `useFastMode`, not
    // fixed for the whole engine: the direct fetcher always backs fast mode,
    // and the configured `FetchMode` only decides the *default* fetcher used
    // when fast mode isn't requested.
    let base_timeout = std::time::Duration::from_secs(config.base_fetch_timeout_secs());
    let direct_fetcher: Arc<dyn Fetcher> = Arc::new(DirectFetcher::new(base_timeout));
    let default_fetcher: Arc<dyn Fetcher> = match config.fetch_mode() {
        FetchMode::Direct => Arc::clone(&direct_fetcher),
        FetchMode::Rendering => Arc::new(RenderingFetcher::with_timeout(
            config.rendering_endpoint().cloned().unwrap_or_default(),
            base_timeout,
        )),
    };
    let fetcher: Arc<dyn Fetcher> = Arc::new(CompositeFetcher::new(default_fetcher, direct_fetcher));

    let circuit_breaker = Arc::new(CircuitBreaker::new(
        config.circuit_breaker_failure_threshold(),
        config.circuit_breaker_success_threshold(),
        std::time::Duration::from_secs(config.circuit_breaker_half_open_timeout_secs()),
    ));
    let retry_queue = Arc::new(RetryQueue::new(Arc::clone(&circuit_breaker)));
    let domain_limiter = Arc::new(DomainLimiter::new(config.max_concurrent_per_domain()));
    let rate_limiter = Arc::new(CrawlRateLimiter::new());
    let discovery = Arc::new(crawl_engine::crawler::LinkDiscovery::new(Arc::clone(&kv)));

    let webhook: Arc<dyn WebhookSender> = Arc::new(HttpWebhookSender::with_backoff(
        config.webhook_max_attempts(),
        std::time::Duration::from_millis(config.webhook_initial_backoff_ms()),
    ));

    let ctx = WorkerContext {
        kv,
        queue,
        fetcher,
        sitemap_client,
        discovery,
        circuit_breaker,
        retry_queue,
        domain_limiter,
        rate_limiter,
        coordinator: Arc::clone(&coordinator),
        webhook,
        domain_rate_rps: config.domain_rate_rps(),
        document_cache_ttl: std::time::Duration::from_secs(config.document_cache_ttl_secs()),
    };

    for _ in 0..config.worker_count() {
        let ctx = ctx.clone();
        tokio::spawn(crawl_engine::run_worker(ctx));
    }

    coordinator
}
