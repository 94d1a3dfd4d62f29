//! Crawl coordinator: `submit` turns a validated request into a persisted
//! `StoredCrawl` plus its first wave of queued jobs (spec §4.1).

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use url::Url;

use super::crawl_types::{
    now_millis, CrawlEngineError, CrawlId, CrawlerOptions, Job, JobId, JobMode, PageOptions, Plan,
    StoredCrawl, TenantId,
};
use super::kv::KvStore;
use super::priority::{
    PriorityPolicy, LARGE_SITEMAP_THRESHOLD, PRIORITY_SINGLE_SEED, PRIORITY_SITEMAP_LARGE_BASE,
    PRIORITY_SITEMAP_SMALL,
};
use super::progress::ProgressAggregator;
use super::queue::JobQueue;
use super::sitemap_client::SitemapClient;
use super::url_policy::is_valid_seed_url;

/// Coordinates crawl submission: validation, robots lookup, seed-vs-sitemap
/// branching, and the first enqueue. Holds the per-crawl progress
/// aggregators so callers can subscribe after `submit` returns.
pub struct Coordinator {
    kv: Arc<dyn KvStore>,
    queue: Arc<dyn JobQueue>,
    sitemap_client: Arc<dyn SitemapClient>,
    priority_policy: Arc<PriorityPolicy>,
    progress: DashMap<CrawlId, Arc<ProgressAggregator>>,
}

impl Coordinator {
    #[must_use]
    pub fn new(
        kv: Arc<dyn KvStore>,
        queue: Arc<dyn JobQueue>,
        sitemap_client: Arc<dyn SitemapClient>,
        priority_policy: Arc<PriorityPolicy>,
    ) -> Self {
        Self {
            kv,
            queue,
            sitemap_client,
            priority_policy,
            progress: DashMap::new(),
        }
    }

    /// Validate, persist, and enqueue a new crawl. Returns the `CrawlId`
    /// once its first wave of jobs is durably queued.
    pub async fn submit(
        &self,
        origin_url: String,
        crawler_options: CrawlerOptions,
        page_options: PageOptions,
        tenant_id: TenantId,
        plan: Plan,
        webhook_urls: Vec<String>,
        webhook_metadata: Option<serde_json::Value>,
    ) -> Result<CrawlId, CrawlEngineError> {
        if !is_valid_seed_url(&origin_url) {
            return Err(CrawlEngineError::Validation(format!(
                "origin url must be an absolute http(s) url: {origin_url}"
            )));
        }
        let crawler_options = crawler_options.compile()?;

        let parsed = Url::parse(&origin_url)
            .map_err(|e| CrawlEngineError::Validation(format!("invalid origin url: {e}")))?;
        let scheme = parsed.scheme().to_string();
        let host = parsed
            .host_str()
            .ok_or_else(|| CrawlEngineError::Validation("origin url has no host".into()))?
            .to_string();

        // Robots absence is not fatal; the worker pipeline just treats it as
        // "allow everything" (spec §4.3).
        let robots = self.sitemap_client.robots(&scheme, &host).await;

        let id = CrawlId::new();
        let stored = StoredCrawl {
            id,
            origin_url: origin_url.clone(),
            crawler_options: crawler_options.clone(),
            page_options: page_options.clone(),
            tenant_id: tenant_id.clone(),
            plan,
            created_at: now_millis(),
            robots,
            terminal: false,
            webhook_urls,
            webhook_metadata,
        };
        self.kv.put_crawl(stored).await?;

        let sitemap_entries = if crawler_options.ignore_sitemap {
            Vec::new()
        } else {
            self.sitemap_client.try_get_sitemap(&origin_url).await
        };

        let jobs = if sitemap_entries.is_empty() {
            self.seed_job(id, &origin_url, &crawler_options, &page_options)
                .await?
        } else {
            self.sitemap_jobs(
                id,
                sitemap_entries,
                &tenant_id,
                plan,
                &crawler_options,
                &page_options,
            )
            .await?
        };

        let aggregator = ProgressAggregator::new(jobs.len());
        self.progress.insert(id, aggregator);

        for job in &jobs {
            self.kv.add_job(id, job.id).await?;
        }
        self.queue.enqueue_bulk(jobs).await?;

        Ok(id)
    }

    async fn seed_job(
        &self,
        id: CrawlId,
        origin_url: &str,
        crawler_options: &CrawlerOptions,
        page_options: &PageOptions,
    ) -> Result<Vec<Job>, CrawlEngineError> {
        if !self.kv.try_lock_url(id, origin_url).await? {
            return Err(CrawlEngineError::LockContention);
        }
        Ok(vec![Job {
            id: JobId::new(),
            crawl_id: id,
            url: origin_url.to_string(),
            mode: JobMode::SingleUrls,
            priority: PRIORITY_SINGLE_SEED,
            sitemapped: false,
            crawler_options: crawler_options.clone(),
            page_options: page_options.clone(),
            sitemap_entry: None,
        }])
    }

    async fn sitemap_jobs(
        &self,
        id: CrawlId,
        entries: Vec<super::crawl_types::SitemapEntry>,
        tenant_id: &TenantId,
        plan: Plan,
        crawler_options: &CrawlerOptions,
        page_options: &PageOptions,
    ) -> Result<Vec<Job>, CrawlEngineError> {
        // Only the 21+ band is adjusted by the Priority Policy; the flat
        // small-sitemap band (20) is not (spec §4.5).
        let priority = if entries.len() > LARGE_SITEMAP_THRESHOLD {
            self.priority_policy
                .priority_for(plan, &tenant_id.0, PRIORITY_SITEMAP_LARGE_BASE)
        } else {
            PRIORITY_SITEMAP_SMALL
        };

        let urls: Vec<String> = entries.iter().map(|e| e.loc.clone()).collect();
        let accepted: HashSet<String> = self.kv.try_lock_urls(id, &urls).await?.into_iter().collect();

        Ok(entries
            .into_iter()
            .filter(|entry| accepted.contains(&entry.loc))
            .map(|entry| Job {
                id: JobId::new(),
                crawl_id: id,
                url: entry.loc.clone(),
                mode: JobMode::SingleUrls,
                priority,
                sitemapped: true,
                crawler_options: crawler_options.clone(),
                page_options: page_options.clone(),
                sitemap_entry: Some(entry),
            })
            .collect())
    }

    /// The progress aggregator for a submitted crawl, if it exists.
    #[must_use]
    pub fn progress(&self, id: CrawlId) -> Option<Arc<ProgressAggregator>> {
        self.progress.get(&id).map(|e| Arc::clone(e.value()))
    }

    /// Mark a crawl terminal; outstanding jobs are skipped as they drain
    /// (spec §5 cancellation).
    pub async fn cancel(&self, id: CrawlId) -> Result<(), CrawlEngineError> {
        self.kv.mark_terminal(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl_engine::crawl_types::SitemapEntry;
    use crate::crawl_engine::kv::InMemoryKvStore;
    use crate::crawl_engine::queue::InMemoryJobQueue;
    use async_trait::async_trait;

    struct FixedSitemapClient {
        entries: Vec<SitemapEntry>,
    }

    #[async_trait]
    impl SitemapClient for FixedSitemapClient {
        async fn robots(&self, _scheme: &str, _host: &str) -> Option<String> {
            None
        }

        fn is_allowed(&self, _robots_body: &str, _user_agent: &str, _url: &str) -> bool {
            true
        }

        async fn sitemap(&self, _scheme: &str, _host: &str) -> Vec<SitemapEntry> {
            self.entries.clone()
        }
    }

    fn coordinator(entries: Vec<SitemapEntry>) -> Coordinator {
        Coordinator::new(
            InMemoryKvStore::new(),
            InMemoryJobQueue::new(),
            Arc::new(FixedSitemapClient { entries }),
            PriorityPolicy::new(),
        )
    }

    #[tokio::test]
    async fn default_ignore_sitemap_submits_single_seed_job() {
        let coordinator = coordinator(vec![SitemapEntry {
            loc: "https://example.com/a".into(),
            changefreq: None,
            priority: None,
            lastmod: None,
        }]);
        let id = coordinator
            .submit(
                "https://example.com/".into(),
                CrawlerOptions::default(),
                PageOptions::default(),
                TenantId("t1".into()),
                Plan::Free,
                Vec::new(),
                None,
            )
            .await
            .unwrap();

        let (_, total) = coordinator.progress(id).unwrap().snapshot();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn sitemap_branch_used_when_ignore_sitemap_disabled() {
        let entries = vec![
            SitemapEntry { loc: "https://example.com/a".into(), changefreq: None, priority: None, lastmod: None },
            SitemapEntry { loc: "https://example.com/b".into(), changefreq: None, priority: None, lastmod: None },
        ];
        let coordinator = coordinator(entries);
        let mut options = CrawlerOptions::default();
        options.ignore_sitemap = false;
        let id = coordinator
            .submit(
                "https://example.com/".into(),
                options,
                PageOptions::default(),
                TenantId("t1".into()),
                Plan::Free,
                Vec::new(),
                None,
            )
            .await
            .unwrap();

        let (_, total) = coordinator.progress(id).unwrap().snapshot();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn enterprise_plan_single_seed_job_keeps_flat_priority_15() {
        let queue = InMemoryJobQueue::new();
        let coordinator = Coordinator::new(
            InMemoryKvStore::new(),
            queue.clone(),
            Arc::new(FixedSitemapClient { entries: vec![] }),
            PriorityPolicy::new(),
        );
        coordinator
            .submit(
                "https://example.com/".into(),
                CrawlerOptions::default(),
                PageOptions::default(),
                TenantId("t1".into()),
                Plan::Enterprise,
                Vec::new(),
                None,
            )
            .await
            .unwrap();

        let job = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(job.priority, PRIORITY_SINGLE_SEED);
    }

    #[tokio::test]
    async fn enterprise_plan_small_sitemap_jobs_keep_flat_priority_20() {
        let entries = vec![SitemapEntry {
            loc: "https://example.com/a".into(),
            changefreq: None,
            priority: None,
            lastmod: None,
        }];
        let queue = InMemoryJobQueue::new();
        let coordinator = Coordinator::new(
            InMemoryKvStore::new(),
            queue.clone(),
            Arc::new(FixedSitemapClient { entries }),
            PriorityPolicy::new(),
        );
        let mut options = CrawlerOptions::default();
        options.ignore_sitemap = false;
        coordinator
            .submit(
                "https://example.com/".into(),
                options,
                PageOptions::default(),
                TenantId("t1".into()),
                Plan::Enterprise,
                Vec::new(),
                None,
            )
            .await
            .unwrap();

        let job = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(job.priority, PRIORITY_SITEMAP_SMALL);
    }

    #[tokio::test]
    async fn invalid_origin_url_rejected() {
        let coordinator = coordinator(vec![]);
        let result = coordinator
            .submit(
                "not-a-url".into(),
                CrawlerOptions::default(),
                PageOptions::default(),
                TenantId("t1".into()),
                Plan::Free,
                Vec::new(),
                None,
            )
            .await;
        assert!(matches!(result, Err(CrawlEngineError::Validation(_))));
    }

    #[tokio::test]
    async fn webhook_config_persisted_on_stored_crawl() {
        let kv = InMemoryKvStore::new();
        let coordinator = Coordinator::new(
            kv.clone(),
            InMemoryJobQueue::new(),
            Arc::new(FixedSitemapClient { entries: vec![] }),
            PriorityPolicy::new(),
        );
        let id = coordinator
            .submit(
                "https://example.com/a".into(),
                CrawlerOptions::default(),
                PageOptions::default(),
                TenantId("t1".into()),
                Plan::Free,
                vec!["https://hooks.example.com/crawl".into()],
                Some(serde_json::json!({"caller": "test"})),
            )
            .await
            .unwrap();

        let stored = kv.get_crawl(id).await.unwrap().unwrap();
        assert_eq!(stored.webhook_urls, vec!["https://hooks.example.com/crawl"]);
        assert_eq!(stored.webhook_metadata, Some(serde_json::json!({"caller": "test"})));
    }
}
