//! Fluent builder for `EngineConfig`.
//!
//! Every field has a workable default (spec §10), so unlike the crawl
//! submission fields in `crawl_engine` (which use a typestate builder to
//! enforce a required origin URL at compile time), nothing here must be set
//! before `build()` — there is only one builder state.

use super::types::{EngineConfig, FetchMode};

pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfig {
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: EngineConfig::default(),
        }
    }
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count.max(1);
        self
    }

    /// Switches the engine to `FetchMode::Rendering` and points it at
    /// `endpoint`.
    #[must_use]
    pub fn rendering_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.rendering_endpoint = Some(endpoint.into());
        self.config.fetch_mode = FetchMode::Rendering;
        self
    }

    #[must_use]
    pub fn base_fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.base_fetch_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn domain_rate_rps(mut self, rps: f64) -> Self {
        self.config.domain_rate_rps = rps;
        self
    }

    #[must_use]
    pub fn max_concurrent_per_domain(mut self, n: usize) -> Self {
        self.config.max_concurrent_per_domain = n.max(1);
        self
    }

    #[must_use]
    pub fn circuit_breaker(
        mut self,
        failure_threshold: u32,
        success_threshold: u32,
        half_open_timeout_secs: u64,
    ) -> Self {
        self.config.circuit_breaker_failure_threshold = failure_threshold;
        self.config.circuit_breaker_success_threshold = success_threshold;
        self.config.circuit_breaker_half_open_timeout_secs = half_open_timeout_secs;
        self
    }

    #[must_use]
    pub fn webhook_retry(mut self, max_attempts: u32, initial_backoff_ms: u64) -> Self {
        self.config.webhook_max_attempts = max_attempts;
        self.config.webhook_initial_backoff_ms = initial_backoff_ms;
        self
    }

    #[must_use]
    pub fn document_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.document_cache_ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
