//! Single-use enforcement for consumption-sensitive tokens.
//!
//! Refresh tokens are consumed, not merely presented: the first successful
//! validation-for-consumption records the token's `jti`, and every later
//! presentation of the same id is rejected. The check-and-record step is a
//! single atomic map insertion, so two concurrent refresh attempts with the
//! same token yield exactly one success.
//!
//! Memory is bounded: past the configured capacity a cleanup pass purges
//! entries whose tokens have expired, and if that is not enough the whole
//! set is flushed. A flush opens a narrow re-replay window for ids recorded
//! just before it; that trade-off is accepted in exchange for a hard memory
//! bound, and flushes are counted so operators can see them.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::warn;

/// Counts-only snapshot of replay-guard activity.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReplayStats {
    /// Consumed token ids currently tracked.
    pub tracked: usize,
    /// Presentations rejected as replays.
    pub replays_blocked: u64,
    /// Full flushes performed under memory pressure.
    pub flushes: u64,
}

/// Tracks consumed token ids.
pub struct ReplayGuard {
    /// jti -> the token's expiry, after which the entry is dead weight.
    consumed: DashMap<String, i64>,
    capacity: usize,
    replays_blocked: AtomicU64,
    flushes: AtomicU64,
}

impl ReplayGuard {
    /// Creates a guard that triggers cleanup past `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            consumed: DashMap::new(),
            capacity: capacity.max(1),
            replays_blocked: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        }
    }

    /// Atomically records a token id as consumed.
    ///
    /// Returns `true` on first consumption, `false` if the id was already
    /// recorded. Exactly one of any number of concurrent calls with the
    /// same id returns `true`.
    pub fn check_and_record(&self, jti: &str, expires_at: i64) -> bool {
        if self.consumed.len() >= self.capacity {
            self.cleanup();
        }

        match self.consumed.entry(jti.to_string()) {
            Entry::Occupied(_) => {
                self.replays_blocked.fetch_add(1, Ordering::Relaxed);
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
                true
            }
        }
    }

    /// Purges entries for expired tokens; flushes everything if the set is
    /// still over capacity afterwards.
    fn cleanup(&self) {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.consumed.retain(|_, expires_at| *expires_at > now);

        if self.consumed.len() >= self.capacity {
            self.consumed.clear();
            self.flushes.fetch_add(1, Ordering::Relaxed);
            warn!(capacity = self.capacity, "replay guard flushed under memory pressure");
        }
    }

    /// Returns a counts-only activity snapshot.
    #[must_use]
    pub fn stats(&self) -> ReplayStats {
        ReplayStats {
            tracked: self.consumed.len(),
            replays_blocked: self.replays_blocked.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn future_exp() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp() + 3600
    }

    #[test]
    fn test_first_consumption_succeeds_second_fails() {
        let guard = ReplayGuard::new(100);
        let exp = future_exp();
        assert!(guard.check_and_record("jti-1", exp));
        assert!(!guard.check_and_record("jti-1", exp));
        assert_eq!(guard.stats().replays_blocked, 1);
    }

    #[test]
    fn test_distinct_ids_do_not_interfere() {
        let guard = ReplayGuard::new(100);
        let exp = future_exp();
        assert!(guard.check_and_record("jti-1", exp));
        assert!(guard.check_and_record("jti-2", exp));
    }

    #[test]
    fn test_cleanup_purges_expired_entries() {
        let guard = ReplayGuard::new(4);
        let past = OffsetDateTime::now_utc().unix_timestamp() - 10;
        for i in 0..4 {
            assert!(guard.check_and_record(&format!("old-{i}"), past));
        }
        // The next record triggers cleanup; expired entries go first and
        // no flush is needed.
        assert!(guard.check_and_record("fresh", future_exp()));
        let stats = guard.stats();
        assert_eq!(stats.tracked, 1);
        assert_eq!(stats.flushes, 0);
    }

    #[test]
    fn test_flush_when_all_entries_are_live() {
        let guard = ReplayGuard::new(4);
        let exp = future_exp();
        for i in 0..4 {
            assert!(guard.check_and_record(&format!("live-{i}"), exp));
        }
        assert!(guard.check_and_record("one-more", exp));
        assert_eq!(guard.stats().flushes, 1);
    }

    #[tokio::test]
    async fn test_concurrent_consumption_yields_one_success() {
        let guard = Arc::new(ReplayGuard::new(100));
        let exp = future_exp();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let guard = Arc::clone(&guard);
            handles.push(tokio::spawn(async move {
                guard.check_and_record("contested", exp)
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
        assert_eq!(guard.stats().replays_blocked, 15);
    }
}
