//! Priority Policy: maps `(plan, tenant load, base priority)` to an integer
//! queue priority band (spec §4.5).
//!
//! Must satisfy monotonicity: higher plans never receive a worse (larger)
//! priority than lower plans for the same base, and tenant load above a
//! threshold demotes priority by a bounded amount.

use dashmap::DashMap;
use std::sync::Arc;

use super::crawl_types::Plan;

/// Fixed priority bands named in spec §4.5.
pub const PRIORITY_SINGLE_SEED: i32 = 15;
pub const PRIORITY_SITEMAP_SMALL: i32 = 20;
pub const PRIORITY_SITEMAP_LARGE_BASE: i32 = 21;

/// Sitemaps above this many entries are demoted via the Priority Policy
/// instead of using the flat `PRIORITY_SITEMAP_SMALL` band (spec §4.1).
pub const LARGE_SITEMAP_THRESHOLD: usize = 1000;

/// Tenant request volume above this count within the tracking window is
/// considered "high load" and demotes priority.
const LOAD_THRESHOLD: u64 = 50;

/// Maximum priority demotion applied for tenant load, keeping the policy
/// bounded per spec §4.5.
const MAX_LOAD_DEMOTION: i32 = 5;

fn plan_discount(plan: Plan) -> i32 {
    // Higher plans get a strictly-better-or-equal discount than lower plans
    // for the same base priority, satisfying the monotonicity requirement.
    match plan {
        Plan::Enterprise => 3,
        Plan::Growth => 2,
        Plan::Starter => 1,
        Plan::Free => 0,
    }
}

/// Tracks simple request-count load per tenant so the policy can demote
/// busy tenants. A production deployment would back this with the same KV
/// store as crawl records; an in-process counter is sufficient here since
/// it only ever widens (never narrows) the priority band.
#[derive(Default)]
pub struct PriorityPolicy {
    tenant_load: DashMap<String, u64>,
}

impl PriorityPolicy {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record one more unit of load for `tenant_id` (e.g. one job dispatched).
    pub fn record_load(&self, tenant_id: &str) {
        *self.tenant_load.entry(tenant_id.to_string()).or_insert(0) += 1;
    }

    fn current_load(&self, tenant_id: &str) -> u64 {
        self.tenant_load.get(tenant_id).map(|v| *v).unwrap_or(0)
    }

    /// Compute the effective priority for a job with the given base.
    ///
    /// Lower is sooner. Plan discount is subtracted (better plans go
    /// sooner); load demotion is added (busy tenants go later), clamped so
    /// demotion never exceeds `MAX_LOAD_DEMOTION`.
    #[must_use]
    pub fn priority_for(&self, plan: Plan, tenant_id: &str, base_priority: i32) -> i32 {
        let discount = plan_discount(plan);
        let load = self.current_load(tenant_id);
        let demotion = if load > LOAD_THRESHOLD {
            let over = ((load - LOAD_THRESHOLD) / 10).min(MAX_LOAD_DEMOTION as u64) as i32;
            over
        } else {
            0
        };
        (base_priority - discount + demotion).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_plan_never_worse_than_lower_plan() {
        let policy = PriorityPolicy::new();
        let base = PRIORITY_SITEMAP_LARGE_BASE;
        let enterprise = policy.priority_for(Plan::Enterprise, "t-ent", base);
        let free = policy.priority_for(Plan::Free, "t-free", base);
        assert!(enterprise <= free);
    }

    #[test]
    fn load_above_threshold_demotes_bounded() {
        let policy = PriorityPolicy::new();
        let base = PRIORITY_SITEMAP_LARGE_BASE;
        let before = policy.priority_for(Plan::Growth, "busy", base);
        for _ in 0..200 {
            policy.record_load("busy");
        }
        let after = policy.priority_for(Plan::Growth, "busy", base);
        assert!(after >= before);
        assert!(after - before <= MAX_LOAD_DEMOTION);
    }

    #[test]
    fn large_sitemap_uses_base_21_or_worse() {
        let policy = PriorityPolicy::new();
        let p = policy.priority_for(Plan::Growth, "t1", PRIORITY_SITEMAP_LARGE_BASE);
        assert!(p >= PRIORITY_SITEMAP_LARGE_BASE - plan_discount(Plan::Growth));
    }
}
