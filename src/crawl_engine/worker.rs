//! Worker pipeline: dequeue → fetch → extract → emit, with retry/backoff
//! routed through the circuit breaker and retry queue (spec §4.6).
//!
//! A transient failure (network reset, timeout, 5xx) goes back through the
//! `RetryQueue` once its domain's circuit allows another attempt; a
//! permanent failure (4xx, malformed response) is emitted as a failed
//! `Document` and never retried.

use std::sync::Arc;
use std::time::Duration;

use scraper::Html;

use super::circuit_breaker::{extract_domain, CircuitBreaker};
use super::coordinator::Coordinator;
use super::crawl_types::{
    CrawlEngineError, Document, DocumentMetadata, FailureKind, Job, SitemapMetadata, StoredCrawl,
};
use super::crawler::LinkDiscovery;
use super::domain_limiter::DomainLimiter;
use super::fetch::{FetchedPage, Fetcher};
use super::kv::KvStore;
use super::path_rewrite::rewrite_paths_absolute;
use super::priority::PRIORITY_SITEMAP_SMALL;
use super::queue::{JobQueue, JobStatus, ProgressUpdate};
use super::rate_limiter::{CrawlRateLimiter, RateLimitDecision};
use super::retry_queue::RetryQueue;
use super::sitemap_client::SitemapClient;
use super::webhook::{WebhookPayload, WebhookSender};

const USER_AGENT: &str = "crawl-engine";
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// All the shared dependencies a worker dispatches a job through. Cheap to
/// clone (every field is an `Arc`); one instance is shared across however
/// many worker tasks `main` spawns.
#[derive(Clone)]
pub struct WorkerContext {
    pub kv: Arc<dyn KvStore>,
    pub queue: Arc<dyn JobQueue>,
    pub fetcher: Arc<dyn Fetcher>,
    pub sitemap_client: Arc<dyn SitemapClient>,
    pub discovery: Arc<LinkDiscovery>,
    pub circuit_breaker: Arc<CircuitBreaker>,
    pub retry_queue: Arc<RetryQueue>,
    pub domain_limiter: Arc<DomainLimiter>,
    pub rate_limiter: Arc<CrawlRateLimiter>,
    pub coordinator: Arc<Coordinator>,
    pub webhook: Arc<dyn WebhookSender>,
    /// Per-domain civility pacing; per-tenant overrides can widen or narrow
    /// this once a plan-tiered limiter is wired in.
    pub domain_rate_rps: f64,
    /// TTL applied to entries written to the `web-scraper-cache` KV family
    /// (spec §6) after a successful fetch.
    pub document_cache_ttl: Duration,
}

/// Runs one worker's dequeue loop until the process is torn down. Intended
/// to be spawned as its own task; `main` spawns one per configured worker
/// count.
pub async fn run(ctx: WorkerContext) {
    loop {
        for job in ctx.retry_queue.drain_ready() {
            let _ = ctx.queue.enqueue(job).await;
        }

        match ctx.queue.dequeue().await {
            Ok(Some(job)) => process_job(&ctx, job).await,
            Ok(None) => tokio::time::sleep(IDLE_POLL_INTERVAL).await,
            Err(err) => {
                log::error!("queue dequeue failed: {err}");
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            }
        }
    }
}

async fn process_job(ctx: &WorkerContext, job: Job) {
    let crawl = match ctx.kv.get_crawl(job.crawl_id).await {
        Ok(Some(crawl)) => crawl,
        Ok(None) => {
            log::warn!("job {} references unknown crawl {}", job.id, job.crawl_id);
            return;
        }
        Err(err) => {
            log::error!("failed to load crawl {}: {err}", job.crawl_id);
            return;
        }
    };

    if crawl.terminal {
        let _ = ctx.kv.remove_job(job.crawl_id, job.id).await;
        return;
    }

    handle_job(ctx, job, &crawl).await;
}

async fn handle_job(ctx: &WorkerContext, job: Job, crawl: &StoredCrawl) {
    let domain = extract_domain(&job.url).unwrap_or_default();

    if !ctx.circuit_breaker.should_attempt(&domain) {
        ctx.retry_queue.add(job);
        return;
    }

    if let Some(robots) = &crawl.robots {
        if !ctx.sitemap_client.is_allowed(robots, USER_AGENT, &job.url) {
            let err = CrawlEngineError::PolicyReject("blocked by robots.txt".into());
            complete(
                ctx,
                &job,
                crawl,
                JobStatus::Failed,
                skipped_document(&job, "blocked by robots.txt"),
                Some(&err),
            )
            .await;
            return;
        }
    }

    // `web-scraper-cache:<normalizedUrl>` (spec §6): a cache hit from a
    // previous crawl skips the network fetch entirely but still flows
    // through the normal success path (link discovery, document build).
    if let Ok(Some(cached)) = ctx.kv.get_cached_page(&job.url).await {
        on_fetch_success(ctx, &job, crawl, cached).await;
        return;
    }

    loop {
        match ctx.rate_limiter.check(&job.url, ctx.domain_rate_rps).await {
            RateLimitDecision::Allow => break,
            RateLimitDecision::Deny { retry_after } => tokio::time::sleep(retry_after).await,
        }
    }

    let _permit = ctx.domain_limiter.acquire(domain.clone()).await;

    match ctx.fetcher.fetch(&job.url, &job.page_options).await {
        Ok(page) => {
            ctx.circuit_breaker.record_success(&domain);
            let _ = ctx
                .kv
                .put_cached_page(&job.url, page.clone(), ctx.document_cache_ttl)
                .await;
            on_fetch_success(ctx, &job, crawl, page).await;
        }
        Err(err) => {
            ctx.circuit_breaker.record_failure(&domain, &err.to_string());
            on_fetch_failure(ctx, job, crawl, err).await;
        }
    }
}

async fn on_fetch_success(ctx: &WorkerContext, job: &Job, crawl: &StoredCrawl, page: FetchedPage) {
    // Recursive expansion always runs (spec §4.2/§4.6 step 5); `include_links`
    // only shapes a job's own output, it never gates crawl scope.
    match ctx
        .discovery
        .discover(crawl, &job.url, &page.html, PRIORITY_SITEMAP_SMALL)
        .await
    {
        Ok(new_jobs) if !new_jobs.is_empty() => {
            for new_job in &new_jobs {
                let _ = ctx.kv.add_job(job.crawl_id, new_job.id).await;
            }
            if let Some(progress) = ctx.coordinator.progress(job.crawl_id) {
                progress.grow_total(new_jobs.len());
            }
            let _ = ctx.queue.enqueue_bulk(new_jobs).await;
        }
        Ok(_) => {}
        Err(err) => log::warn!("link discovery failed for {}: {err}", job.url),
    }

    let document = build_document(job, &page);
    complete(ctx, job, crawl, JobStatus::Completed, document, None).await;
}

async fn on_fetch_failure(ctx: &WorkerContext, job: Job, crawl: &StoredCrawl, err: CrawlEngineError) {
    match classify(&err) {
        FailureKind::Transient => {
            ctx.retry_queue.add(job);
        }
        FailureKind::Permanent => {
            let document = failed_document(&job, &err.to_string());
            complete(ctx, &job, crawl, JobStatus::Failed, document, Some(&err)).await;
        }
    }
}

async fn complete(
    ctx: &WorkerContext,
    job: &Job,
    crawl: &StoredCrawl,
    status: JobStatus,
    document: Document,
    failure: Option<&CrawlEngineError>,
) {
    if !crawl.webhook_urls.is_empty() {
        let payload = WebhookPayload::from_document(
            job.crawl_id,
            job.id,
            &document,
            crawl.webhook_metadata.clone(),
        );
        for endpoint in &crawl.webhook_urls {
            ctx.webhook.deliver(endpoint, &payload).await;
        }
    }

    let (current, total) = if let Some(progress) = ctx.coordinator.progress(job.crawl_id) {
        progress.report(status, Some(job.url.clone()), Some(document));
        progress.snapshot()
    } else {
        (0, 0)
    };
    let _ = ctx
        .queue
        .update_progress(
            job.id,
            ProgressUpdate {
                current,
                total,
                status,
                current_document_url: Some(job.url.clone()),
            },
        )
        .await;
    if let Some(err) = failure {
        let _ = ctx.queue.move_to_failed(job.id, err, false).await;
    }
    let _ = ctx.kv.remove_job(job.crawl_id, job.id).await;
}

fn classify(err: &CrawlEngineError) -> FailureKind {
    match err {
        CrawlEngineError::TransientFetch(_) | CrawlEngineError::Infrastructure(_) => {
            FailureKind::Transient
        }
        _ => FailureKind::Permanent,
    }
}

/// Plain-text extraction from `html`; not markdown conversion (out of
/// scope), just a whitespace-joined text run used for `Document::content`.
fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn sitemap_metadata(job: &Job) -> Option<SitemapMetadata> {
    job.sitemap_entry.as_ref().map(|entry| SitemapMetadata {
        changefreq: entry.changefreq.clone(),
        priority: entry.priority,
        lastmod: entry.lastmod.clone(),
    })
}

fn build_document(job: &Job, page: &FetchedPage) -> Document {
    let content = if job.crawler_options.return_only_urls {
        String::new()
    } else {
        extract_text(&page.html)
    };
    Document {
        content,
        html: if job.page_options.include_raw_html {
            Some(if job.page_options.replace_all_paths_with_absolute_paths {
                rewrite_paths_absolute(&page.html, &job.url)
            } else {
                page.html.clone()
            })
        } else {
            None
        },
        // HTML-to-markdown transformation happens outside this engine.
        markdown: None,
        metadata: DocumentMetadata {
            source_url: job.url.clone(),
            page_status_code: Some(page.status),
            page_error: None,
            sitemap: sitemap_metadata(job),
        },
    }
}

fn failed_document(job: &Job, message: &str) -> Document {
    Document {
        content: String::new(),
        html: None,
        markdown: None,
        metadata: DocumentMetadata {
            source_url: job.url.clone(),
            page_status_code: None,
            page_error: Some(message.to_string()),
            sitemap: sitemap_metadata(job),
        },
    }
}

fn skipped_document(job: &Job, reason: &str) -> Document {
    failed_document(job, reason)
}
