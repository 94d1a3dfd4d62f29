//! Core configuration types for the crawl engine.

use serde::{Deserialize, Serialize};

/// Selects how workers fetch pages (spec §4.7, §10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchMode {
    /// A direct GET through a per-worker cookie-jar-enabled client.
    Direct,
    /// POST to an external rendering service and parse its JSON response.
    Rendering,
}

/// Runtime configuration for the crawl engine binary: worker pool sizing,
/// fetch/backoff timeouts, and the optional rendering/webhook endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub(crate) worker_count: usize,
    pub(crate) fetch_mode: FetchMode,
    pub(crate) rendering_endpoint: Option<String>,
    pub(crate) base_fetch_timeout_secs: u64,
    pub(crate) domain_rate_rps: f64,
    pub(crate) max_concurrent_per_domain: usize,
    pub(crate) circuit_breaker_failure_threshold: u32,
    pub(crate) circuit_breaker_success_threshold: u32,
    pub(crate) circuit_breaker_half_open_timeout_secs: u64,
    pub(crate) webhook_max_attempts: u32,
    pub(crate) webhook_initial_backoff_ms: u64,
    pub(crate) document_cache_ttl_secs: u64,
}

impl EngineConfig {
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    #[must_use]
    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    #[must_use]
    pub fn rendering_endpoint(&self) -> Option<&String> {
        self.rendering_endpoint.as_ref()
    }

    #[must_use]
    pub fn base_fetch_timeout_secs(&self) -> u64 {
        self.base_fetch_timeout_secs
    }

    #[must_use]
    pub fn domain_rate_rps(&self) -> f64 {
        self.domain_rate_rps
    }

    #[must_use]
    pub fn max_concurrent_per_domain(&self) -> usize {
        self.max_concurrent_per_domain
    }

    #[must_use]
    pub fn circuit_breaker_failure_threshold(&self) -> u32 {
        self.circuit_breaker_failure_threshold
    }

    #[must_use]
    pub fn circuit_breaker_success_threshold(&self) -> u32 {
        self.circuit_breaker_success_threshold
    }

    #[must_use]
    pub fn circuit_breaker_half_open_timeout_secs(&self) -> u64 {
        self.circuit_breaker_half_open_timeout_secs
    }

    #[must_use]
    pub fn webhook_max_attempts(&self) -> u32 {
        self.webhook_max_attempts
    }

    #[must_use]
    pub fn webhook_initial_backoff_ms(&self) -> u64 {
        self.webhook_initial_backoff_ms
    }

    #[must_use]
    pub fn document_cache_ttl_secs(&self) -> u64 {
        self.document_cache_ttl_secs
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: 8,
            fetch_mode: FetchMode::Direct,
            rendering_endpoint: None,
            base_fetch_timeout_secs: 30,
            // Default civility pacing for respectful crawling.
            domain_rate_rps: 2.0,
            max_concurrent_per_domain: 2,
            circuit_breaker_failure_threshold: 5,
            circuit_breaker_success_threshold: 2,
            circuit_breaker_half_open_timeout_secs: 300,
            webhook_max_attempts: 5,
            webhook_initial_backoff_ms: 500,
            document_cache_ttl_secs: 3600,
        }
    }
}
