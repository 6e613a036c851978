//! Core JWT authentication for the netra platform.
//!
//! This crate issues and validates the platform's internal tokens (access,
//! refresh, service) and screens externally issued OAuth ID tokens. The
//! center of the API is [`JwtHandler`], which composes:
//!
//! - [`secret::SecretResolver`]: layered signing-secret resolution with
//!   environment-scaled strictness
//! - [`codec::TokenCodec`]: structural validation, pinned-algorithm
//!   signature verification, and timing checks
//! - [`claims::ClaimsPolicy`]: kind, issuer, audience, environment, and
//!   service bindings
//! - [`blacklist::BlacklistStore`]: dual-tier revocation over a pluggable
//!   [`storage::RevocationStorage`] backend
//! - [`replay::ReplayGuard`]: atomic single-use enforcement for refresh
//!   rotation
//!
//! Validation never panics and never errors on hostile input; a rejected
//! token is `None`. Real errors (broken configuration, storage outages)
//! surface as [`AuthError`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use netra_auth::{AuthConfig, Environment, JwtHandler, TokenKind};
//! use netra_auth::secret::{SigningAlgorithm, SigningMaterial};
//! use netra_auth_memory::InMemoryRevocationStorage;
//!
//! # async fn run() -> netra_auth::AuthResult<()> {
//! let config = AuthConfig::new(Environment::Development, "netra-backend");
//! let material = SigningMaterial::new(b"dev-only-secret-dev-only-secret!".to_vec(), SigningAlgorithm::HS256);
//! let handler = JwtHandler::new(config, &material, Arc::new(InMemoryRevocationStorage::new()))?;
//!
//! let token = handler.create_access_token("user-1", None, None)?;
//! let claims = handler.validate_token(&token, TokenKind::Access).await;
//! assert!(claims.is_some());
//! # Ok(())
//! # }
//! ```

pub mod blacklist;
pub mod claims;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod replay;
pub mod secret;
pub mod storage;

pub use blacklist::{BlacklistStats, BlacklistStore, token_hash};
pub use claims::{
    IdTokenClaims, TokenClaims, TokenKind, ValidatedClaims, ValidationContext,
};
pub use codec::TokenCodec;
pub use config::{AuthConfig, Environment, FailurePolicy};
pub use error::{AuthError, RejectReason};
pub use handler::{JwtHandler, PerformanceStats, TokenPair, MOCK_TOKEN_PREFIX};
pub use replay::{ReplayGuard, ReplayStats};
pub use secret::{SecretResolver, SecretSource, SigningAlgorithm, SigningMaterial};
pub use storage::{RevocationSnapshot, RevocationStorage};

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;
