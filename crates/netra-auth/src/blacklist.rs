//! Dual-tier revocation registry.
//!
//! The hot tier is an in-process map checked on every validation; the
//! durable tier is an external [`RevocationStorage`] that propagates
//! revocations across instances. The durable store is authoritative and
//! the memory tier is a cache: revokes take effect locally the moment the
//! in-memory insert lands, while persistence happens in a background task
//! that never blocks or fails the caller.
//!
//! Tokens are keyed by SHA-256 hash so raw tokens (which embed claims and
//! are bearer credentials) are never stored verbatim.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tracing::{error, warn};

use crate::config::FailurePolicy;
use crate::storage::RevocationStorage;

/// Computes the stable blacklist key for a token.
#[must_use]
pub fn token_hash(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Counts-only snapshot of blacklist activity. Never contains tokens,
/// hashes, subjects, or secrets.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BlacklistStats {
    /// Tokens currently blacklisted in the hot tier.
    pub tokens_cached: usize,
    /// Subjects currently blacklisted in the hot tier.
    pub subjects_cached: usize,
    /// Total revoke operations accepted.
    pub revocations: u64,
    /// Background persistence writes that failed (retried by
    /// reconciliation, never surfaced to the revoking caller).
    pub persistence_failures: u64,
    /// Durable-store read errors absorbed on the check path.
    pub store_errors: u64,
}

/// Two-tier blacklist for tokens and subjects.
///
/// Hot-tier entries carry the same deadline as their durable counterparts;
/// once past it the token they guard has expired anyway, and the entry is
/// dropped lazily on check and in bulk by [`sync_from_store`](Self::sync_from_store).
pub struct BlacklistStore {
    /// key to entry deadline, for both tiers' TTL semantics.
    tokens: DashMap<String, OffsetDateTime>,
    subjects: DashMap<String, OffsetDateTime>,
    storage: Arc<dyn RevocationStorage>,
    failure_policy: FailurePolicy,
    /// TTL for durable entries: the longest a revoked token could still be
    /// otherwise valid.
    entry_ttl: time::Duration,
    revocations: AtomicU64,
    /// Shared with background persistence tasks.
    persistence_failures: Arc<AtomicU64>,
    store_errors: AtomicU64,
}

impl BlacklistStore {
    /// Creates a store over the given durable backend.
    #[must_use]
    pub fn new(
        storage: Arc<dyn RevocationStorage>,
        failure_policy: FailurePolicy,
        entry_ttl: time::Duration,
    ) -> Self {
        Self {
            tokens: DashMap::new(),
            subjects: DashMap::new(),
            storage,
            failure_policy,
            entry_ttl,
            revocations: AtomicU64::new(0),
            persistence_failures: Arc::new(AtomicU64::new(0)),
            store_errors: AtomicU64::new(0),
        }
    }

    fn entry_deadline(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc() + self.entry_ttl
    }

    /// Blacklists a single token.
    ///
    /// Returns `true` once the in-memory insert succeeds; the durable
    /// write runs in the background and its failure is logged and counted,
    /// never propagated. Idempotent.
    pub fn blacklist_token(&self, token: &str) -> bool {
        let hash = token_hash(token);
        self.tokens.insert(hash.clone(), self.entry_deadline());
        self.revocations.fetch_add(1, Ordering::Relaxed);
        self.persist(move |storage, deadline| async move {
            storage.add_token(&hash, deadline).await
        });
        true
    }

    /// Blacklists every current and future token of a subject.
    pub fn blacklist_user(&self, subject: &str) -> bool {
        let subject = subject.to_string();
        self.subjects.insert(subject.clone(), self.entry_deadline());
        self.revocations.fetch_add(1, Ordering::Relaxed);
        self.persist(move |storage, deadline| async move {
            storage.add_subject(&subject, deadline).await
        });
        true
    }

    /// Un-revokes a single token in both tiers.
    ///
    /// Unlike revocation, removal awaits the durable write: an un-revoke
    /// that only lands locally would leave the token blocked on every
    /// other instance. Returns `false` if the durable removal failed.
    pub async fn remove_token(&self, token: &str) -> bool {
        let hash = token_hash(token);
        self.tokens.remove(&hash);
        match self.storage.remove_token(&hash).await {
            Ok(()) => true,
            Err(e) => {
                self.store_errors.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "failed to remove token from durable blacklist");
                false
            }
        }
    }

    /// Un-revokes a subject in both tiers.
    pub async fn remove_user(&self, subject: &str) -> bool {
        self.subjects.remove(subject);
        match self.storage.remove_subject(subject).await {
            Ok(()) => true,
            Err(e) => {
                self.store_errors.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "failed to remove subject from durable blacklist");
                false
            }
        }
    }

    /// Expiry-aware hot-tier lookup. A live entry answers `true`; an
    /// expired entry is dropped and treated as a miss.
    fn cached(map: &DashMap<String, OffsetDateTime>, key: &str) -> bool {
        let deadline = map.get(key).map(|entry| *entry.value());
        match deadline {
            Some(deadline) if deadline > OffsetDateTime::now_utc() => true,
            Some(_) => {
                map.remove(key);
                false
            }
            None => false,
        }
    }

    /// Checks whether a token is blacklisted. Memory first; on a miss,
    /// falls through to the durable store and caches a positive answer.
    pub async fn is_token_blacklisted(&self, token: &str) -> bool {
        let hash = token_hash(token);
        if Self::cached(&self.tokens, &hash) {
            return true;
        }
        match self.storage.is_token_revoked(&hash).await {
            Ok(true) => {
                self.tokens.insert(hash, self.entry_deadline());
                true
            }
            Ok(false) => false,
            Err(e) => self.absorb_store_error(e),
        }
    }

    /// Checks whether a subject is blacklisted.
    pub async fn is_user_blacklisted(&self, subject: &str) -> bool {
        if Self::cached(&self.subjects, subject) {
            return true;
        }
        match self.storage.is_subject_revoked(subject).await {
            Ok(true) => {
                self.subjects.insert(subject.to_string(), self.entry_deadline());
                true
            }
            Ok(false) => false,
            Err(e) => self.absorb_store_error(e),
        }
    }

    /// Warms the hot tier from the durable store and prunes expired local
    /// entries. Called at startup and suitable for periodic reconciliation.
    ///
    /// Snapshot entries are cached under a fresh deadline; the durable
    /// store remains the authority on their real expiry, which it enforces
    /// by omitting dead entries from later snapshots.
    ///
    /// # Errors
    ///
    /// Returns the storage error; entries loaded before the failure are
    /// kept.
    pub async fn sync_from_store(&self) -> crate::AuthResult<()> {
        self.prune_expired();
        let snapshot = self.storage.load_snapshot().await?;
        let deadline = self.entry_deadline();
        for hash in snapshot.token_hashes {
            self.tokens.insert(hash, deadline);
        }
        for subject in snapshot.subjects {
            self.subjects.insert(subject, deadline);
        }
        Ok(())
    }

    /// Drops hot-tier entries past their deadline.
    fn prune_expired(&self) {
        let now = OffsetDateTime::now_utc();
        self.tokens.retain(|_, deadline| *deadline > now);
        self.subjects.retain(|_, deadline| *deadline > now);
    }

    /// Returns a counts-only activity snapshot.
    #[must_use]
    pub fn stats(&self) -> BlacklistStats {
        BlacklistStats {
            tokens_cached: self.tokens.len(),
            subjects_cached: self.subjects.len(),
            revocations: self.revocations.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }

    /// The answer for a check the durable store could not serve: deny if
    /// configured for high-security deployments, otherwise stay available
    /// and log loudly.
    fn absorb_store_error(&self, e: crate::AuthError) -> bool {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
        let deny = self.failure_policy == FailurePolicy::FailClosed;
        warn!(
            error = %e,
            fail_closed = deny,
            "durable blacklist store unavailable during check"
        );
        deny
    }

    /// Fires a durable write in the background. Requires a tokio runtime;
    /// errors are counted and logged, never returned.
    fn persist<F, Fut>(&self, write: F)
    where
        F: FnOnce(Arc<dyn RevocationStorage>, OffsetDateTime) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = crate::AuthResult<()>> + Send,
    {
        let storage = Arc::clone(&self.storage);
        let deadline = self.entry_deadline();
        let failures = Arc::clone(&self.persistence_failures);
        tokio::spawn(async move {
            if let Err(e) = write(storage, deadline).await {
                failures.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, "failed to persist blacklist entry to durable store");
            }
        });
    }
}
