//! Sitemap & robots client (spec §4.3).
//!
//! `robots()` and `sitemap()` each have an independent fetch timeout and
//! never propagate a fetch failure to the caller — robots absence and
//! sitemap absence are both legitimate, non-fatal outcomes the coordinator
//! falls back on.

use std::time::Duration;

use async_trait::async_trait;
use robotstxt::DefaultMatcher;
use sitemap::reader::{SiteMapEntity, SiteMapReader};
use sitemap::structs::Location;
use url::Url;

use super::crawl_types::SitemapEntry;

const USER_AGENT: &str = "crawl-engine";
const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);
const SITEMAP_TIMEOUT: Duration = Duration::from_secs(15);
/// Bound recursive sitemap-index resolution so a malicious/misconfigured
/// index can't make `sitemap()` recurse unboundedly.
const MAX_SITEMAP_RECURSION: u32 = 5;

#[async_trait]
pub trait SitemapClient: Send + Sync {
    /// Fetch `<scheme>://<host>/robots.txt`. Returns `None` on any failure;
    /// never propagates an error to the caller (spec §4.3).
    async fn robots(&self, scheme: &str, host: &str) -> Option<String>;

    /// Whether `user_agent` may fetch `url` per the given robots.txt body.
    /// Absent/empty body is treated as "allow everything".
    fn is_allowed(&self, robots_body: &str, user_agent: &str, url: &str) -> bool;

    /// Recursively resolve sitemap indexes starting from
    /// `<scheme>://<host>/sitemap.xml`, returning normalized entries.
    /// Returns an empty list on any error (spec §4.3).
    async fn sitemap(&self, scheme: &str, host: &str) -> Vec<SitemapEntry>;

    /// Sitemap entries for the host of `seed_url`.
    async fn try_get_sitemap(&self, seed_url: &str) -> Vec<SitemapEntry> {
        let Ok(parsed) = Url::parse(seed_url) else {
            return Vec::new();
        };
        let Some(host) = parsed.host_str() else {
            return Vec::new();
        };
        self.sitemap(parsed.scheme(), host).await
    }
}

/// `reqwest`-backed implementation shared by the coordinator and worker pipeline.
pub struct HttpSitemapClient {
    client: reqwest::Client,
}

impl Default for HttpSitemapClient {
    fn default() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

impl HttpSitemapClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn fetch_text(&self, url: &str, timeout: Duration) -> Option<String> {
        let response = tokio::time::timeout(timeout, self.client.get(url).send())
            .await
            .ok()?
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.text().await.ok()
    }

    async fn resolve_sitemap(&self, url: &str, depth: u32, out: &mut Vec<SitemapEntry>) {
        if depth > MAX_SITEMAP_RECURSION {
            log::warn!("sitemap recursion limit hit at {url}");
            return;
        }
        let Some(body) = self.fetch_text(url, SITEMAP_TIMEOUT).await else {
            return;
        };

        let reader = SiteMapReader::new(body.as_bytes());
        let mut child_sitemaps = Vec::new();
        for entity in reader {
            match entity {
                SiteMapEntity::Url(entry) => {
                    if let Location::Url(loc) = entry.loc {
                        out.push(SitemapEntry {
                            loc: loc.to_string(),
                            changefreq: entry.changefreq.map(|c| format!("{c:?}").to_lowercase()),
                            priority: entry.priority.and_then(|p| format!("{p:?}").parse().ok()),
                            lastmod: entry.lastmod.map(|l| format!("{l:?}")),
                        });
                    }
                }
                SiteMapEntity::SiteMap(entry) => {
                    if let Location::Url(loc) = entry.loc {
                        child_sitemaps.push(loc.to_string());
                    }
                }
                SiteMapEntity::Err(err) => {
                    log::debug!("sitemap parse error in {url}: {err}");
                }
            }
        }

        for child in child_sitemaps {
            Box::pin(self.resolve_sitemap(&child, depth + 1, out)).await;
        }
    }
}

#[async_trait]
impl SitemapClient for HttpSitemapClient {
    async fn robots(&self, scheme: &str, host: &str) -> Option<String> {
        let url = format!("{scheme}://{host}/robots.txt");
        tokio::time::timeout(ROBOTS_TIMEOUT, self.fetch_text(&url, ROBOTS_TIMEOUT))
            .await
            .ok()
            .flatten()
    }

    fn is_allowed(&self, robots_body: &str, user_agent: &str, url: &str) -> bool {
        if robots_body.trim().is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(robots_body, user_agent, url)
    }

    async fn sitemap(&self, scheme: &str, host: &str) -> Vec<SitemapEntry> {
        let mut out = Vec::new();
        let url = format!("{scheme}://{host}/sitemap.xml");
        self.resolve_sitemap(&url, 0, &mut out).await;
        out
    }
}
