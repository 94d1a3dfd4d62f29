//! Retry queue for circuit-breaker-rejected jobs.
//!
//! When the circuit breaker is OPEN for a domain, jobs destined for that
//! domain are preserved here instead of being discarded or retried
//! immediately. When the circuit transitions to `HalfOpen`, items are
//! drained back to the main queue for another attempt.

use dashmap::DashMap;
use log::info;
use std::sync::Arc;

use super::circuit_breaker::{extract_domain, CircuitBreaker};
use super::crawl_types::Job;

/// Holds jobs rejected by the circuit breaker for later retry.
///
/// Items are keyed by domain so we can efficiently check which domains
/// have recovered (transitioned to `HalfOpen` or `Closed`).
pub struct RetryQueue {
    items: DashMap<String, Vec<Job>>,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl RetryQueue {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            items: DashMap::new(),
            circuit_breaker,
        }
    }

    /// Add a job rejected due to an open circuit.
    pub fn add(&self, job: Job) {
        if let Ok(domain) = extract_domain(&job.url) {
            let mut entry = self.items.entry(domain).or_default();
            entry.push(job);
        }
    }

    /// Drain jobs ready for retry (circuit now `HalfOpen` or `Closed`).
    ///
    /// `should_attempt()` also triggers the Open→HalfOpen transition if the
    /// domain's timeout has elapsed.
    pub fn drain_ready(&self) -> Vec<Job> {
        let mut ready = Vec::new();
        let mut domains_to_clear = Vec::new();

        for entry in self.items.iter() {
            let domain = entry.key();
            if self.circuit_breaker.should_attempt(domain) {
                domains_to_clear.push(domain.clone());
            }
        }

        for domain in domains_to_clear {
            if let Some((_, jobs)) = self.items.remove(&domain) {
                info!(
                    "circuit breaker recovery: re-queueing {} job(s) for domain {}",
                    jobs.len(),
                    domain
                );
                ready.extend(jobs);
            }
        }

        ready
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.iter().map(|e| e.value().len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
