//! Crawler state machine: per-page link discovery (spec §4.2).
//!
//! A fetched page's links run through a fixed pipeline before becoming new
//! jobs: depth check, external-host gating, include/exclude match, lock-set
//! dedup, then admission against `min(limit, maxCrawledLinks)`. Each
//! surviving link transitions from `Unseen` to `Locked` atomically via the
//! KV store's lock set; everything after that point belongs to the worker
//! pipeline's `Fetching` → `{Emitted, Skipped, Failed}` states.

use std::collections::HashSet;
use std::sync::Arc;

use scraper::{Html, Selector};
use url::Url;

use super::crawl_types::{CrawlEngineError, Job, JobId, JobMode, StoredCrawl};
use super::kv::KvStore;
use super::url_policy::{
    adjusted_max_depth, comparable_host, matches_include_exclude, normalize, path_of, url_depth,
};

/// Runs the link-discovery admission pipeline against a single crawl's KV
/// store. Stateless beyond the KV handle; safe to share across workers.
pub struct LinkDiscovery {
    kv: Arc<dyn KvStore>,
}

impl LinkDiscovery {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Extract same-document `<a href>` targets from `html`, resolved
    /// against `page_url`. Non-`http(s)` targets (mailto:, javascript:,
    /// etc.) are dropped.
    #[must_use]
    pub fn extract_links(html: &str, page_url: &str) -> Vec<String> {
        let Ok(base) = Url::parse(page_url) else {
            return Vec::new();
        };
        let document = Html::parse_document(html);
        let Ok(selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };
        document
            .select(&selector)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| base.join(href).ok())
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .map(|u| u.to_string())
            .collect()
    }

    /// Run links discovered on `page_url` through the admission pipeline,
    /// returning the jobs to enqueue. `priority` is assigned by the caller —
    /// discovered jobs always land in the flat "discovered crawl job" band
    /// (spec §4.5); discovery itself only decides membership.
    pub async fn discover(
        &self,
        crawl: &StoredCrawl,
        page_url: &str,
        html: &str,
        priority: i32,
    ) -> Result<Vec<Job>, CrawlEngineError> {
        let options = &crawl.crawler_options;
        let max_depth = adjusted_max_depth(&crawl.origin_url, options.max_depth);
        let seed_host = comparable_host(&crawl.origin_url);
        let admission_cap = options.limit.min(options.max_crawled_links);

        let mut candidates = Vec::new();
        let mut seen_in_batch = HashSet::new();
        for link in Self::extract_links(html, page_url) {
            if url_depth(&link) > max_depth {
                continue;
            }
            if !options.allow_external_links && comparable_host(&link) != seed_host {
                continue;
            }
            if !matches_include_exclude(
                &path_of(&link),
                &options.includes_compiled,
                &options.excludes_compiled,
            ) {
                continue;
            }
            if seen_in_batch.insert(normalize(&link)) {
                candidates.push(link);
            }
        }

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let already_locked = self.kv.lock_set_size(crawl.id).await?;
        if already_locked >= admission_cap {
            return Ok(Vec::new());
        }
        let remaining = admission_cap - already_locked;
        if candidates.len() > remaining {
            candidates.truncate(remaining);
        }

        let accepted = self.kv.try_lock_urls(crawl.id, &candidates).await?;

        Ok(accepted
            .into_iter()
            .map(|url| Job {
                id: JobId::new(),
                crawl_id: crawl.id,
                url,
                mode: JobMode::SingleUrls,
                priority,
                sitemapped: false,
                crawler_options: options.clone(),
                page_options: crawl.page_options.clone(),
                sitemap_entry: None,
            })
            .collect())
    }
}
