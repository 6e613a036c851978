//! Durable revocation storage trait.
//!
//! The blacklist's authoritative tier is an external set-membership store
//! with TTL support. Any backend meeting this contract is acceptable: a
//! key-value cache, a relational table with an `expires_at` column, etc.
//! The in-memory reference implementation lives in `netra-auth-memory`;
//! production deployments supply their own backend crate.
//!
//! # Implementation Notes
//!
//! - Entries carry an expiry equal to the maximum possible remaining token
//!   lifetime; once past it, the token they guard has expired anyway and
//!   the entry can be lazily expunged.
//! - Writes must be idempotent: revoking an already-revoked entry succeeds.
//! - Membership checks run on the validation path only as a cache-miss
//!   fallback, but should still be fast.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;

/// A point-in-time copy of all live revocation entries, used to warm the
/// in-memory tier at startup.
#[derive(Debug, Clone, Default)]
pub struct RevocationSnapshot {
    /// SHA-256 hashes of individually revoked tokens.
    pub token_hashes: Vec<String>,
    /// Subjects whose every token is revoked.
    pub subjects: Vec<String>,
}

/// Storage trait for the durable revocation registry.
///
/// Token entries are keyed by hash; the raw token never reaches storage.
/// Subject entries are keyed by the subject identifier itself.
#[async_trait]
pub trait RevocationStorage: Send + Sync {
    /// Records a revoked token hash with its cleanup deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn add_token(&self, token_hash: &str, expires_at: OffsetDateTime) -> AuthResult<()>;

    /// Removes a token hash from the registry (un-revoke).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove_token(&self, token_hash: &str) -> AuthResult<()>;

    /// Checks whether a token hash is currently revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn is_token_revoked(&self, token_hash: &str) -> AuthResult<bool>;

    /// Records a revoked subject with its cleanup deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn add_subject(&self, subject: &str, expires_at: OffsetDateTime) -> AuthResult<()>;

    /// Removes a subject from the registry (un-revoke).
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn remove_subject(&self, subject: &str) -> AuthResult<()>;

    /// Checks whether a subject is currently revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn is_subject_revoked(&self, subject: &str) -> AuthResult<bool>;

    /// Returns all live entries, for warming the in-memory tier.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn load_snapshot(&self) -> AuthResult<RevocationSnapshot>;

    /// Deletes entries past their expiry, returning the count removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> AuthResult<u64>;
}
