//! In-memory [`RevocationStorage`] backend.
//!
//! The reference storage implementation: a pair of expiry-aware maps behind
//! async locks. Suitable for single-instance deployments, local development,
//! and tests; multi-instance deployments need a shared backend so that a
//! revocation on one instance is visible on all of them.
//!
//! Expired entries are dropped lazily on read and in bulk by
//! [`cleanup_expired`](InMemoryRevocationStorage::cleanup_expired).

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use netra_auth::{AuthResult, RevocationSnapshot, RevocationStorage};

/// Expiry-aware in-memory revocation registry.
#[derive(Debug, Default)]
pub struct InMemoryRevocationStorage {
    tokens: RwLock<HashMap<String, OffsetDateTime>>,
    subjects: RwLock<HashMap<String, OffsetDateTime>>,
}

impl InMemoryRevocationStorage {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(expires_at: OffsetDateTime) -> bool {
        expires_at > OffsetDateTime::now_utc()
    }

    async fn check(map: &RwLock<HashMap<String, OffsetDateTime>>, key: &str) -> bool {
        let expires_at = { map.read().await.get(key).copied() };
        let Some(expires_at) = expires_at else {
            return false;
        };
        if Self::is_live(expires_at) {
            return true;
        }
        // The entry exists but has expired; drop it.
        map.write().await.remove(key);
        false
    }

    fn live_keys(map: &HashMap<String, OffsetDateTime>) -> Vec<String> {
        map.iter()
            .filter(|(_, expires_at)| Self::is_live(**expires_at))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

#[async_trait]
impl RevocationStorage for InMemoryRevocationStorage {
    async fn add_token(&self, token_hash: &str, expires_at: OffsetDateTime) -> AuthResult<()> {
        self.tokens.write().await.insert(token_hash.to_string(), expires_at);
        Ok(())
    }

    async fn remove_token(&self, token_hash: &str) -> AuthResult<()> {
        self.tokens.write().await.remove(token_hash);
        Ok(())
    }

    async fn is_token_revoked(&self, token_hash: &str) -> AuthResult<bool> {
        Ok(Self::check(&self.tokens, token_hash).await)
    }

    async fn add_subject(&self, subject: &str, expires_at: OffsetDateTime) -> AuthResult<()> {
        self.subjects.write().await.insert(subject.to_string(), expires_at);
        Ok(())
    }

    async fn remove_subject(&self, subject: &str) -> AuthResult<()> {
        self.subjects.write().await.remove(subject);
        Ok(())
    }

    async fn is_subject_revoked(&self, subject: &str) -> AuthResult<bool> {
        Ok(Self::check(&self.subjects, subject).await)
    }

    async fn load_snapshot(&self) -> AuthResult<RevocationSnapshot> {
        Ok(RevocationSnapshot {
            token_hashes: Self::live_keys(&*self.tokens.read().await),
            subjects: Self::live_keys(&*self.subjects.read().await),
        })
    }

    async fn cleanup_expired(&self) -> AuthResult<u64> {
        let mut removed = 0u64;
        for map in [&self.tokens, &self.subjects] {
            let mut guard = map.write().await;
            let before = guard.len();
            guard.retain(|_, expires_at| Self::is_live(*expires_at));
            removed += (before - guard.len()) as u64;
        }
        Ok(removed)
    }
}
