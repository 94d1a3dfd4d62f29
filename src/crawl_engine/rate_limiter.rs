//! Per-domain crawl rate limiter for respectful web crawling.
//!
//! A token bucket per domain, refilled continuously based on elapsed time
//! since the bucket's base instant. State lives behind a `Mutex` rather than
//! a lock-free CAS loop: domain-level contention is low (one bucket serves
//! at most `max_concurrent_per_domain` workers) and a plain mutex keeps this
//! portable to stable Rust without fixed-point packing tricks.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Scaling factor for fixed-point token arithmetic (1000x precision).
const TOKEN_SCALE: u64 = 1000;
/// Scaling factor for nanosecond rate calculations.
const RATE_SCALE: u64 = 1_000_000;

/// Rate limit decision for a crawl request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allow,
    /// Contains the duration to wait before retrying.
    Deny { retry_after: Duration },
}

/// `(tokens, last_refill_nanos)`, both scaled by `TOKEN_SCALE`/`RATE_SCALE`
/// respectively.
struct BucketState {
    tokens: u64,
    last_refill_nanos: u64,
}

struct DomainRateLimiter {
    state: Mutex<BucketState>,
    rate_per_nano: u64,
    max_tokens: u64,
}

impl DomainRateLimiter {
    fn new(rate_rps: f64, base_time: &Instant) -> Self {
        let max_tokens = (rate_rps.max(1.0) * TOKEN_SCALE as f64) as u64;
        let rate_per_nano =
            ((rate_rps * TOKEN_SCALE as f64 * RATE_SCALE as f64) / 1_000_000_000.0) as u64;
        let now_nanos = base_time.elapsed().as_nanos() as u64;
        Self {
            state: Mutex::new(BucketState {
                tokens: max_tokens,
                last_refill_nanos: now_nanos,
            }),
            rate_per_nano,
            max_tokens,
        }
    }

    fn try_consume_token(&self, base_time: &Instant) -> RateLimitDecision {
        let now_nanos = base_time.elapsed().as_nanos() as u64;
        let mut state = self.state.lock().expect("rate limiter mutex poisoned");
        self.refill_locked(&mut state, now_nanos);

        if state.tokens < TOKEN_SCALE {
            let tokens_needed = TOKEN_SCALE.saturating_sub(state.tokens);
            let nanos_needed = if self.rate_per_nano > 0 {
                (tokens_needed.saturating_mul(RATE_SCALE)) / self.rate_per_nano
            } else {
                1_000_000
            };
            return RateLimitDecision::Deny {
                retry_after: Duration::from_nanos(nanos_needed),
            };
        }

        state.tokens -= TOKEN_SCALE;
        RateLimitDecision::Allow
    }

    /// Refill tokens based on elapsed time since the bucket's last refill.
    /// Advances `last_refill_nanos` only by the time that actually produced
    /// tokens, preserving fractional nanoseconds for future accumulation.
    fn refill_locked(&self, state: &mut BucketState, now_nanos: u64) {
        if now_nanos <= state.last_refill_nanos {
            return;
        }
        let elapsed_nanos = now_nanos.saturating_sub(state.last_refill_nanos);
        let tokens_to_add = (elapsed_nanos.saturating_mul(self.rate_per_nano)) / RATE_SCALE;
        if tokens_to_add == 0 {
            return;
        }
        let time_credited_nanos = if self.rate_per_nano > 0 {
            (tokens_to_add.saturating_mul(RATE_SCALE)) / self.rate_per_nano
        } else {
            0
        };
        state.last_refill_nanos = state.last_refill_nanos.saturating_add(time_credited_nanos);
        state.tokens = state.tokens.saturating_add(tokens_to_add).min(self.max_tokens);
    }
}

/// Instance-based crawl rate limiter. Each instance owns its own domain
/// cache and time reference so tests (and independently configured engines)
/// don't share state.
pub struct CrawlRateLimiter {
    cache: DashMap<String, Arc<DomainRateLimiter>>,
    base_time: Instant,
}

impl Default for CrawlRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlRateLimiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
            base_time: Instant::now(),
        }
    }

    /// Check if a request to `url` should be rate limited. A non-positive
    /// `rate_rps` or an unparseable domain disables limiting for that call
    /// rather than blocking the crawl.
    pub async fn check(&self, url: &str, rate_rps: f64) -> RateLimitDecision {
        if rate_rps <= 0.0 {
            return RateLimitDecision::Allow;
        }
        let domain = match extract_domain(url) {
            Some(domain) if !domain.is_empty() => domain,
            _ => return RateLimitDecision::Allow,
        };
        self.check_domain(&domain, rate_rps)
    }

    fn check_domain(&self, domain: &str, rate_rps: f64) -> RateLimitDecision {
        let limiter = Arc::clone(
            self.cache
                .entry(domain.to_string())
                .or_insert_with(|| Arc::new(DomainRateLimiter::new(rate_rps, &self.base_time)))
                .value(),
        );
        limiter.try_consume_token(&self.base_time)
    }

    pub async fn clear(&self) {
        self.cache.clear();
    }

    pub async fn tracked_count(&self) -> usize {
        self.cache.len()
    }
}

/// Extract a lowercased, `www.`-stripped domain from a URL, accepting both
/// scheme-prefixed and bare-domain forms.
#[must_use]
pub fn extract_domain(url: &str) -> Option<String> {
    let after_scheme = match url.find("://") {
        Some(scheme_end) => &url[scheme_end + 3..],
        None => url,
    };
    let domain_end = after_scheme
        .find(['/', '?', '#', ':'])
        .unwrap_or(after_scheme.len());
    let domain = &after_scheme[..domain_end];
    let normalized = if domain.starts_with("www.") && domain.len() > 4 {
        &domain[4..]
    } else {
        domain
    };
    Some(normalized.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_request_allowed_second_denied() {
        let limiter = CrawlRateLimiter::new();
        assert_eq!(
            limiter.check("https://example.com/a", 1.0).await,
            RateLimitDecision::Allow
        );
        assert!(matches!(
            limiter.check("https://example.com/b", 1.0).await,
            RateLimitDecision::Deny { .. }
        ));
    }

    #[tokio::test]
    async fn domains_are_tracked_independently() {
        let limiter = CrawlRateLimiter::new();
        assert_eq!(
            limiter.check("https://a.example.com", 1.0).await,
            RateLimitDecision::Allow
        );
        assert_eq!(
            limiter.check("https://b.example.com", 1.0).await,
            RateLimitDecision::Allow
        );
        assert_eq!(limiter.tracked_count().await, 2);
    }

    #[tokio::test]
    async fn non_positive_rate_always_allows() {
        let limiter = CrawlRateLimiter::new();
        for _ in 0..5 {
            assert_eq!(
                limiter.check("https://example.com", 0.0).await,
                RateLimitDecision::Allow
            );
        }
    }

    #[tokio::test]
    async fn clear_resets_tracked_domains() {
        let limiter = CrawlRateLimiter::new();
        limiter.check("https://example.com", 1.0).await;
        assert_eq!(limiter.tracked_count().await, 1);
        limiter.clear().await;
        assert_eq!(limiter.tracked_count().await, 0);
    }

    #[test]
    fn extract_domain_strips_www_and_scheme() {
        assert_eq!(
            extract_domain("https://www.example.com/path"),
            Some("example.com".to_string())
        );
        assert_eq!(extract_domain("example.com:8080/path"), Some("example.com".to_string()));
    }
}
