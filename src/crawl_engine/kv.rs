//! KV store adapter: durable crawl records, the URL lock set, and job
//! membership (spec §4, §6 "Persisted state layout").
//!
//! The trait is the injection seam (spec §9 "model as interface-typed
//! dependencies"); `InMemoryKvStore` is the reference implementation used by
//! the binary and the test suite. A production deployment swaps in a Redis-
//! or Postgres-backed implementation without touching the coordinator or
//! worker pipeline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::crawl_types::{CrawlEngineError, CrawlId, JobId, StoredCrawl};
use super::fetch::FetchedPage;
use super::url_policy::normalize;

/// Durable shared state behind the crawl coordinator and worker pipeline.
///
/// All lock-set writes must be atomic "set if absent" operations (spec §5);
/// `try_lock_url` is the primitive every caller goes through.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Persist a new `StoredCrawl`. Called exactly once per crawl, at submission.
    async fn put_crawl(&self, crawl: StoredCrawl) -> Result<(), CrawlEngineError>;

    /// Read-only lookup by id.
    async fn get_crawl(&self, id: CrawlId) -> Result<Option<StoredCrawl>, CrawlEngineError>;

    /// Mark a crawl terminal (spec §5 cancellation). Idempotent.
    async fn mark_terminal(&self, id: CrawlId) -> Result<(), CrawlEngineError>;

    /// Atomically insert `url` (normalized) into the crawl's lock set.
    /// Returns `true` if this caller won the race and should proceed,
    /// `false` if the URL was already locked (spec §3 "Invariant: atomic").
    async fn try_lock_url(&self, crawl: CrawlId, url: &str) -> Result<bool, CrawlEngineError>;

    /// Bulk variant of `try_lock_url`, used by sitemap bulk-enqueue. Returns
    /// only the URLs that were newly locked, in input order.
    async fn try_lock_urls(
        &self,
        crawl: CrawlId,
        urls: &[String],
    ) -> Result<Vec<String>, CrawlEngineError> {
        let mut accepted = Vec::with_capacity(urls.len());
        for url in urls {
            if self.try_lock_url(crawl, url).await? {
                accepted.push(url.clone());
            }
        }
        Ok(accepted)
    }

    /// Current size of the crawl's lock set (used for the `limit`/
    /// `maxCrawledLinks` admission check in link discovery).
    async fn lock_set_size(&self, crawl: CrawlId) -> Result<usize, CrawlEngineError>;

    /// Record that `job` belongs to `crawl`'s job membership set.
    async fn add_job(&self, crawl: CrawlId, job: JobId) -> Result<(), CrawlEngineError>;

    /// Remove `job` from the membership set (worker completion); used to
    /// decide crawl completion (spec §7: "complete when its job set drains").
    async fn remove_job(&self, crawl: CrawlId, job: JobId) -> Result<(), CrawlEngineError>;

    /// Count of jobs still outstanding for `crawl`.
    async fn outstanding_jobs(&self, crawl: CrawlId) -> Result<usize, CrawlEngineError>;

    /// Optional cached raw fetch, keyed by normalized URL
    /// (`web-scraper-cache:<normalizedUrl>` in spec §6), with a TTL. Caches
    /// the page prior to `Document` transformation so a hit still flows
    /// through the worker's normal link-discovery/document-build path.
    async fn get_cached_page(&self, url: &str) -> Result<Option<FetchedPage>, CrawlEngineError>;

    /// Cache a fetched page with the given time-to-live.
    async fn put_cached_page(
        &self,
        url: &str,
        page: FetchedPage,
        ttl: Duration,
    ) -> Result<(), CrawlEngineError>;
}

struct CrawlRecord {
    crawl: StoredCrawl,
    locks: HashSet<String>,
    jobs: HashSet<JobId>,
}

struct CachedPage {
    page: FetchedPage,
    expires_at: Instant,
}

/// In-process `KvStore` backed by `DashMap`s. Suitable for a single-process
/// deployment or tests; every method is a suspension point in the trait
/// signature so a distributed implementation can be dropped in later without
/// touching callers (spec §5).
#[derive(Default)]
pub struct InMemoryKvStore {
    crawls: DashMap<CrawlId, CrawlRecord>,
    cache: DashMap<String, CachedPage>,
}

impl InMemoryKvStore {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn put_crawl(&self, crawl: StoredCrawl) -> Result<(), CrawlEngineError> {
        self.crawls.insert(
            crawl.id,
            CrawlRecord {
                crawl,
                locks: HashSet::new(),
                jobs: HashSet::new(),
            },
        );
        Ok(())
    }

    async fn get_crawl(&self, id: CrawlId) -> Result<Option<StoredCrawl>, CrawlEngineError> {
        Ok(self.crawls.get(&id).map(|r| r.crawl.clone()))
    }

    async fn mark_terminal(&self, id: CrawlId) -> Result<(), CrawlEngineError> {
        if let Some(mut record) = self.crawls.get_mut(&id) {
            record.crawl.terminal = true;
        }
        Ok(())
    }

    async fn try_lock_url(&self, crawl: CrawlId, url: &str) -> Result<bool, CrawlEngineError> {
        let mut record = self
            .crawls
            .get_mut(&crawl)
            .ok_or_else(|| CrawlEngineError::Infrastructure(format!("unknown crawl {crawl}")))?;
        Ok(record.locks.insert(normalize(url)))
    }

    async fn lock_set_size(&self, crawl: CrawlId) -> Result<usize, CrawlEngineError> {
        let record = self
            .crawls
            .get(&crawl)
            .ok_or_else(|| CrawlEngineError::Infrastructure(format!("unknown crawl {crawl}")))?;
        Ok(record.locks.len())
    }

    async fn add_job(&self, crawl: CrawlId, job: JobId) -> Result<(), CrawlEngineError> {
        let mut record = self
            .crawls
            .get_mut(&crawl)
            .ok_or_else(|| CrawlEngineError::Infrastructure(format!("unknown crawl {crawl}")))?;
        record.jobs.insert(job);
        Ok(())
    }

    async fn remove_job(&self, crawl: CrawlId, job: JobId) -> Result<(), CrawlEngineError> {
        if let Some(mut record) = self.crawls.get_mut(&crawl) {
            record.jobs.remove(&job);
        }
        Ok(())
    }

    async fn outstanding_jobs(&self, crawl: CrawlId) -> Result<usize, CrawlEngineError> {
        let record = self
            .crawls
            .get(&crawl)
            .ok_or_else(|| CrawlEngineError::Infrastructure(format!("unknown crawl {crawl}")))?;
        Ok(record.jobs.len())
    }

    async fn get_cached_page(&self, url: &str) -> Result<Option<FetchedPage>, CrawlEngineError> {
        let key = normalize(url);
        if let Some(entry) = self.cache.get(&key) {
            if entry.expires_at > Instant::now() {
                return Ok(Some(entry.page.clone()));
            }
        }
        self.cache.remove(&key);
        Ok(None)
    }

    async fn put_cached_page(
        &self,
        url: &str,
        page: FetchedPage,
        ttl: Duration,
    ) -> Result<(), CrawlEngineError> {
        self.cache.insert(
            normalize(url),
            CachedPage {
                page,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl_engine::crawl_types::{CrawlerOptions, PageOptions, Plan, TenantId};

    fn sample_crawl(id: CrawlId) -> StoredCrawl {
        StoredCrawl {
            id,
            origin_url: "https://example.com/a".into(),
            crawler_options: CrawlerOptions::default(),
            page_options: PageOptions::default(),
            tenant_id: TenantId("t1".into()),
            plan: Plan::Free,
            created_at: 0,
            robots: None,
            terminal: false,
            webhook_urls: Vec::new(),
            webhook_metadata: None,
        }
    }

    #[tokio::test]
    async fn lock_is_atomic_set_if_absent() {
        let kv = InMemoryKvStore::new();
        let id = CrawlId::new();
        kv.put_crawl(sample_crawl(id)).await.unwrap();

        assert!(kv.try_lock_url(id, "https://example.com/a").await.unwrap());
        assert!(!kv.try_lock_url(id, "https://example.com/a").await.unwrap());
        // www./non-www. collapse to the same lock entry.
        assert!(!kv.try_lock_url(id, "https://www.example.com/a").await.unwrap());
        assert_eq!(kv.lock_set_size(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn job_membership_tracks_outstanding_count() {
        let kv = InMemoryKvStore::new();
        let id = CrawlId::new();
        kv.put_crawl(sample_crawl(id)).await.unwrap();

        let job = JobId::new();
        kv.add_job(id, job).await.unwrap();
        assert_eq!(kv.outstanding_jobs(id).await.unwrap(), 1);
        kv.remove_job(id, job).await.unwrap();
        assert_eq!(kv.outstanding_jobs(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cache_respects_ttl() {
        let kv = InMemoryKvStore::new();
        let page = FetchedPage { status: 200, html: "<html>hi</html>".into() };
        kv.put_cached_page("https://example.com/a", page, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(kv.get_cached_page("https://example.com/a").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(kv.get_cached_page("https://example.com/a").await.unwrap().is_none());
    }
}
