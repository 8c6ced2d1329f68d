//! Hierarchical rate limiting.
//!
//! Four token-bucket levels are checked for every invocation:
//!
//! ```text
//! tool ──► session ──► tenant ──► global
//! ```
//!
//! The tightest bucket wins: if any level rejects, the invocation is
//! rate-limited and the surfaced retry-after is the longest wait among
//! the rejecting levels. Buckets are shared across sessions and live
//! behind lock-free counters (the `governor` crate), never the
//! per-session path.

use confab_types::{SessionId, TenantId};
use governor::clock::{Clock, DefaultClock};
use governor::state::keyed::DefaultKeyedStateStore;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

type Direct = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;
type Keyed<K> = RateLimiter<K, DefaultKeyedStateStore<K>, DefaultClock>;

/// Token-bucket parameters for one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSettings {
    /// Sustained replenish rate.
    pub per_minute: u32,
    /// Burst capacity.
    pub burst: u32,
}

impl QuotaSettings {
    /// Creates settings; zero values disable the level.
    #[must_use]
    pub fn new(per_minute: u32, burst: u32) -> Self {
        Self { per_minute, burst }
    }

    fn quota(&self) -> Option<Quota> {
        let per_minute = NonZeroU32::new(self.per_minute)?;
        let burst = NonZeroU32::new(self.burst)?;
        Some(Quota::per_minute(per_minute).allow_burst(burst))
    }
}

/// Per-level quota configuration.
///
/// `None` disables a level entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Per tool name.
    pub per_tool: Option<QuotaSettings>,
    /// Per session.
    pub per_session: Option<QuotaSettings>,
    /// Per tenant.
    pub per_tenant: Option<QuotaSettings>,
    /// Whole deployment.
    pub global: Option<QuotaSettings>,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            per_tool: Some(QuotaSettings::new(30, 10)),
            per_session: Some(QuotaSettings::new(60, 20)),
            per_tenant: Some(QuotaSettings::new(600, 100)),
            global: Some(QuotaSettings::new(6000, 500)),
        }
    }
}

/// A rejection from the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitExceeded {
    /// Level that produced the longest wait: `tool`, `session`,
    /// `tenant`, or `global`.
    pub scope: &'static str,
    /// Wait until the tightest bucket permits the call.
    pub retry_after: Duration,
}

/// The four-level token-bucket hierarchy.
pub struct HierarchicalLimiter {
    per_tool: Option<Keyed<String>>,
    per_session: Option<Keyed<SessionId>>,
    per_tenant: Option<Keyed<TenantId>>,
    global: Option<Direct>,
    clock: DefaultClock,
}

impl HierarchicalLimiter {
    /// Builds the hierarchy from settings.
    #[must_use]
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            per_tool: settings
                .per_tool
                .and_then(|s| s.quota())
                .map(RateLimiter::keyed),
            per_session: settings
                .per_session
                .and_then(|s| s.quota())
                .map(RateLimiter::keyed),
            per_tenant: settings
                .per_tenant
                .and_then(|s| s.quota())
                .map(RateLimiter::keyed),
            global: settings
                .global
                .and_then(|s| s.quota())
                .map(RateLimiter::direct),
            clock: DefaultClock::default(),
        }
    }

    /// Checks every level; the tightest rejecting bucket wins.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitExceeded`] with the longest retry-after among
    /// the rejecting levels.
    pub fn check(
        &self,
        tool: &str,
        session: SessionId,
        tenant: TenantId,
    ) -> Result<(), RateLimitExceeded> {
        let now = self.clock.now();
        let mut worst: Option<RateLimitExceeded> = None;

        let mut note = |scope: &'static str, wait: Duration| {
            if worst.as_ref().map_or(true, |w| wait > w.retry_after) {
                worst = Some(RateLimitExceeded {
                    scope,
                    retry_after: wait,
                });
            }
        };

        if let Some(limiter) = &self.per_tool {
            if let Err(not_until) = limiter.check_key(&tool.to_string()) {
                note("tool", not_until.wait_time_from(now));
            }
        }
        if let Some(limiter) = &self.per_session {
            if let Err(not_until) = limiter.check_key(&session) {
                note("session", not_until.wait_time_from(now));
            }
        }
        if let Some(limiter) = &self.per_tenant {
            if let Err(not_until) = limiter.check_key(&tenant) {
                note("tenant", not_until.wait_time_from(now));
            }
        }
        if let Some(limiter) = &self.global {
            if let Err(not_until) = limiter.check() {
                note("global", not_until.wait_time_from(now));
            }
        }

        match worst {
            Some(exceeded) => {
                debug!(
                    scope = exceeded.scope,
                    retry_after_ms = exceeded.retry_after.as_millis() as u64,
                    tool,
                    "rate limit exceeded"
                );
                Err(exceeded)
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tight_tool_settings() -> RateLimitSettings {
        RateLimitSettings {
            per_tool: Some(QuotaSettings::new(60, 2)),
            per_session: None,
            per_tenant: None,
            global: None,
        }
    }

    #[test]
    fn allows_within_burst() {
        let limiter = HierarchicalLimiter::new(&tight_tool_settings());
        let session = SessionId::new();
        let tenant = TenantId::new();

        assert!(limiter.check("lookup", session, tenant).is_ok());
        assert!(limiter.check("lookup", session, tenant).is_ok());
    }

    #[test]
    fn rejects_past_burst_with_retry_after() {
        let limiter = HierarchicalLimiter::new(&tight_tool_settings());
        let session = SessionId::new();
        let tenant = TenantId::new();

        let _ = limiter.check("lookup", session, tenant);
        let _ = limiter.check("lookup", session, tenant);
        let err = limiter
            .check("lookup", session, tenant)
            .expect_err("third call should be limited");

        assert_eq!(err.scope, "tool");
        assert!(err.retry_after > Duration::ZERO);
    }

    #[test]
    fn buckets_are_per_key() {
        let limiter = HierarchicalLimiter::new(&tight_tool_settings());
        let session = SessionId::new();
        let tenant = TenantId::new();

        let _ = limiter.check("a", session, tenant);
        let _ = limiter.check("a", session, tenant);
        assert!(limiter.check("a", session, tenant).is_err());

        // A different tool has its own bucket.
        assert!(limiter.check("b", session, tenant).is_ok());
    }

    #[test]
    fn session_bucket_rejects_across_tools() {
        let settings = RateLimitSettings {
            per_tool: None,
            per_session: Some(QuotaSettings::new(60, 1)),
            per_tenant: None,
            global: None,
        };
        let limiter = HierarchicalLimiter::new(&settings);
        let session = SessionId::new();
        let tenant = TenantId::new();

        assert!(limiter.check("a", session, tenant).is_ok());
        let err = limiter.check("b", session, tenant).unwrap_err();
        assert_eq!(err.scope, "session");

        // Another session is unaffected.
        assert!(limiter.check("a", SessionId::new(), tenant).is_ok());
    }

    #[test]
    fn disabled_levels_never_reject() {
        let settings = RateLimitSettings {
            per_tool: None,
            per_session: None,
            per_tenant: None,
            global: None,
        };
        let limiter = HierarchicalLimiter::new(&settings);
        let session = SessionId::new();
        let tenant = TenantId::new();

        for _ in 0..100 {
            assert!(limiter.check("t", session, tenant).is_ok());
        }
    }

    #[test]
    fn zero_quota_disables_level() {
        assert!(QuotaSettings::new(0, 5).quota().is_none());
        assert!(QuotaSettings::new(5, 0).quota().is_none());
        assert!(QuotaSettings::new(5, 5).quota().is_some());
    }
}
