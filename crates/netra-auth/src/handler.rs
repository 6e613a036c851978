//! The JWT handler: issuance, validation, rotation, and revocation.
//!
//! [`JwtHandler`] wires the codec, claims policy, blacklist, and replay
//! guard into one object with the full token lifecycle behind it. It is
//! cheap to share (`Arc<JwtHandler>`) and every method is safe under
//! concurrent use.
//!
//! Validation methods return `Option`: a rejected token yields `None`,
//! never an error and never a panic, regardless of how hostile the input
//! is. The reason for each rejection feeds structured logs and the
//! security-violation counter instead.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::blacklist::{BlacklistStats, BlacklistStore};
use crate::claims::{
    ClaimsPolicy, IdTokenClaims, TokenClaims, TokenKind, ValidatedClaims, ValidationContext,
};
use crate::codec::TokenCodec;
use crate::config::AuthConfig;
use crate::error::{AuthError, RejectReason};
use crate::replay::{ReplayGuard, ReplayStats};
use crate::secret::{EnvVarSource, SecretResolver, SigningMaterial};
use crate::storage::RevocationStorage;
use crate::AuthResult;

/// Prefix marking a mock token. Mock tokens bypass cryptographic
/// verification and are only honored when [`AuthConfig::mock_tokens_allowed`]
/// is true; everywhere else they are rejected and counted as a security
/// violation.
pub const MOCK_TOKEN_PREFIX: &str = "mock_";

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    /// The new access token.
    pub access_token: String,
    /// The new refresh token. The one it replaced is consumed and can
    /// never be used again.
    pub refresh_token: String,
}

/// Counts-only operational snapshot. Never contains tokens, subjects,
/// hashes, or secrets.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    /// Tokens issued since startup.
    pub tokens_issued: u64,
    /// Tokens that passed full validation.
    pub tokens_validated: u64,
    /// Tokens rejected by any validation stage.
    pub tokens_rejected: u64,
    /// Rejections classified as likely attack traffic.
    pub security_violations: u64,
    /// Whether mock tokens are currently accepted.
    pub mock_tokens_enabled: bool,
    /// Blacklist activity.
    pub blacklist: BlacklistStats,
    /// Replay-guard activity.
    pub replay: ReplayStats,
}

/// Issues and validates every kind of token this system handles.
pub struct JwtHandler {
    codec: TokenCodec,
    policy: ClaimsPolicy,
    blacklist: BlacklistStore,
    replay: ReplayGuard,
    config: AuthConfig,
    tokens_issued: AtomicU64,
    tokens_validated: AtomicU64,
    tokens_rejected: AtomicU64,
    security_violations: AtomicU64,
}

impl std::fmt::Debug for JwtHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // No field output: the inner components hold signing material that
        // must never reach logs.
        f.debug_struct("JwtHandler").finish_non_exhaustive()
    }
}

impl JwtHandler {
    /// Creates a handler from explicit signing material.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the configuration is
    /// internally inconsistent.
    pub fn new(
        config: AuthConfig,
        material: &SigningMaterial,
        storage: Arc<dyn RevocationStorage>,
    ) -> AuthResult<Self> {
        if config.service_id.is_empty() {
            return Err(AuthError::configuration("service_id must not be empty"));
        }
        if config.clock_skew > config.max_token_age {
            return Err(AuthError::configuration(
                "clock_skew must not exceed max_token_age",
            ));
        }

        let codec = TokenCodec::new(
            material,
            config.clock_skew.as_secs() as i64,
            config.max_token_age.as_secs() as i64,
        );
        let policy = ClaimsPolicy::new(
            config.environment,
            config.service_id.clone(),
            material.secret().to_vec(),
            config.require_jti,
        );
        // Blacklist entries only need to outlive the longest-lived token.
        let entry_ttl = time::Duration::seconds(config.refresh_token_lifetime.as_secs() as i64);
        let blacklist = BlacklistStore::new(storage, config.failure_policy, entry_ttl);
        let replay = ReplayGuard::new(config.replay_capacity);

        if config.mock_tokens_allowed() {
            warn!(
                environment = %config.environment,
                "mock token acceptance is enabled"
            );
        }
        info!(
            environment = %config.environment,
            service_id = %config.service_id,
            algorithm = %codec.algorithm(),
            "jwt handler initialized"
        );

        Ok(Self {
            codec,
            policy,
            blacklist,
            replay,
            config,
            tokens_issued: AtomicU64::new(0),
            tokens_validated: AtomicU64::new(0),
            tokens_rejected: AtomicU64::new(0),
            security_violations: AtomicU64::new(0),
        })
    }

    /// Creates a handler by resolving the signing secret from process
    /// environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when no acceptable secret is
    /// configured in a production-like environment.
    pub fn from_env(
        config: AuthConfig,
        storage: Arc<dyn RevocationStorage>,
    ) -> AuthResult<Self> {
        let resolver = SecretResolver::new(config.environment, config.algorithm);
        let material = resolver.resolve(&EnvVarSource)?;
        Self::new(config, &material, storage)
    }

    /// Warms the blacklist's hot tier from the durable store.
    ///
    /// # Errors
    ///
    /// Returns the storage error.
    pub async fn sync_blacklist(&self) -> AuthResult<()> {
        self.blacklist.sync_from_store().await
    }

    // Issuance -----------------------------------------------------------

    /// Issues an access token for a user.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Encoding`] if serialization fails.
    pub fn create_access_token(
        &self,
        subject: &str,
        email: Option<&str>,
        permissions: Option<Vec<String>>,
    ) -> AuthResult<String> {
        let mut claims = self.claims_for(TokenKind::Access, subject);
        claims.email = email.map(str::to_string);
        claims.permissions = permissions;
        self.issue(&claims)
    }

    /// Issues a refresh token for a user.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Encoding`] if serialization fails.
    pub fn create_refresh_token(
        &self,
        subject: &str,
        email: Option<&str>,
        permissions: Option<Vec<String>>,
    ) -> AuthResult<String> {
        let mut claims = self.claims_for(TokenKind::Refresh, subject);
        claims.email = email.map(str::to_string);
        claims.permissions = permissions;
        self.issue(&claims)
    }

    /// Issues a service-to-service token identifying the named service.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Encoding`] if serialization fails.
    pub fn create_service_token(
        &self,
        service_id: &str,
        service_name: &str,
    ) -> AuthResult<String> {
        let mut claims = self.claims_for(TokenKind::Service, service_id);
        claims.service_name = Some(service_name.to_string());
        self.issue(&claims)
    }

    fn claims_for(&self, kind: TokenKind, subject: &str) -> TokenClaims {
        let lifetime = match kind {
            TokenKind::Access | TokenKind::ExternalId => self.config.access_token_lifetime,
            TokenKind::Refresh => self.config.refresh_token_lifetime,
            TokenKind::Service => self.config.service_token_lifetime,
        };
        let now = OffsetDateTime::now_utc().unix_timestamp();
        TokenClaims::new(
            kind,
            subject,
            now,
            now + lifetime.as_secs() as i64,
            self.config.environment,
            self.config.service_id.clone(),
        )
    }

    fn issue(&self, claims: &TokenClaims) -> AuthResult<String> {
        let token = self.codec.encode(claims)?;
        self.tokens_issued.fetch_add(1, Ordering::Relaxed);
        debug!(kind = %claims.token_type, "token issued");
        Ok(token)
    }

    // Validation ---------------------------------------------------------

    /// Validates a token of the expected kind.
    ///
    /// Runs the full pipeline: structure, pinned-algorithm signature,
    /// timing, claims policy, and both blacklist tiers. Returns `None` on
    /// any failure; this method never panics and never errors.
    pub async fn validate_token(&self, token: &str, expected: TokenKind) -> Option<ValidatedClaims> {
        match self.validate_inner(token, expected, ValidationContext::Standard).await {
            Ok(validated) => {
                self.tokens_validated.fetch_add(1, Ordering::Relaxed);
                Some(validated)
            }
            Err(reason) => {
                self.note_rejection(reason, expected);
                None
            }
        }
    }

    /// Validates a single-use token and atomically consumes it.
    ///
    /// On top of [`validate_token`](Self::validate_token), the token must
    /// carry a `jti` and that `jti` must never have been consumed before.
    /// Of any number of concurrent calls with the same token, exactly one
    /// succeeds.
    pub async fn validate_token_for_consumption(
        &self,
        token: &str,
        expected: TokenKind,
    ) -> Option<ValidatedClaims> {
        let result = self
            .consume_inner(token, expected, ValidationContext::Standard)
            .await;
        match result {
            Ok(validated) => {
                self.tokens_validated.fetch_add(1, Ordering::Relaxed);
                Some(validated)
            }
            Err(reason) => {
                self.note_rejection(reason, expected);
                None
            }
        }
    }

    /// Validates a service token minted by a different service instance.
    ///
    /// This is the only entry point that relaxes the service-id binding,
    /// and the relaxation rides on replay protection: the token must carry
    /// a `jti` and is consumed on acceptance, so a captured cross-service
    /// token cannot be presented twice. [`validate_token`](Self::validate_token)
    /// keeps the strict binding for service tokens issued by this instance.
    pub async fn validate_cross_service_token(&self, token: &str) -> Option<ValidatedClaims> {
        let result = self
            .consume_inner(token, TokenKind::Service, ValidationContext::CrossService)
            .await;
        match result {
            Ok(validated) => {
                self.tokens_validated.fetch_add(1, Ordering::Relaxed);
                Some(validated)
            }
            Err(reason) => {
                self.note_rejection(reason, TokenKind::Service);
                None
            }
        }
    }

    async fn consume_inner(
        &self,
        token: &str,
        expected: TokenKind,
        context: ValidationContext,
    ) -> Result<ValidatedClaims, RejectReason> {
        let validated = self.validate_inner(token, expected, context).await?;
        let jti = validated.claims.jti.as_deref().ok_or(RejectReason::MissingClaim)?;
        if !self.replay.check_and_record(jti, validated.claims.exp) {
            return Err(RejectReason::Replayed);
        }
        Ok(validated)
    }

    async fn validate_inner(
        &self,
        token: &str,
        expected: TokenKind,
        context: ValidationContext,
    ) -> Result<ValidatedClaims, RejectReason> {
        if let Some(subject) = token.strip_prefix(MOCK_TOKEN_PREFIX) {
            return self.validate_mock(subject, expected);
        }

        let claims = self.codec.decode(token)?;
        let validated = self.policy.validate(&claims, expected, context)?;

        if self.blacklist.is_token_blacklisted(token).await {
            return Err(RejectReason::TokenBlacklisted);
        }
        if self.blacklist.is_user_blacklisted(&validated.claims.sub).await {
            return Err(RejectReason::SubjectBlacklisted);
        }

        Ok(validated)
    }

    /// Accepts a `mock_<subject>` token with synthesized claims. Reaches
    /// acceptance only when the configuration explicitly enables test mode
    /// in a non-production environment.
    fn validate_mock(
        &self,
        subject: &str,
        expected: TokenKind,
    ) -> Result<ValidatedClaims, RejectReason> {
        if !self.config.mock_tokens_allowed() {
            return Err(RejectReason::MockToken);
        }
        if subject.is_empty() {
            return Err(RejectReason::Malformed);
        }
        let claims = self.claims_for(expected, subject);
        Ok(ValidatedClaims {
            service_signature: self.policy.service_signature(&claims),
            claims,
        })
    }

    /// Validates an externally issued OAuth ID token.
    ///
    /// Checks structure, rejects a `"none"` algorithm, applies timing
    /// checks, and optionally pins the expected issuer. Signature
    /// verification against the provider's keys happens in the OAuth
    /// exchange layer, not here.
    pub fn validate_id_token(
        &self,
        token: &str,
        expected_issuer: Option<&str>,
    ) -> Option<IdTokenClaims> {
        let result = self
            .codec
            .decode_id_token_unverified(token)
            .and_then(|claims| match expected_issuer {
                Some(issuer) if claims.iss != issuer => Err(RejectReason::WrongIssuer),
                _ => Ok(claims),
            });
        match result {
            Ok(claims) => Some(claims),
            Err(reason) => {
                self.note_rejection(reason, TokenKind::ExternalId);
                None
            }
        }
    }

    /// Extracts the subject from a verified token without applying the
    /// claims policy or the blacklist. Signature and timing are still
    /// enforced; this is a convenience for log enrichment and lookups, not
    /// an authentication decision.
    pub fn extract_user_id(&self, token: &str) -> Option<String> {
        if let Some(subject) = token.strip_prefix(MOCK_TOKEN_PREFIX) {
            if self.config.mock_tokens_allowed() && !subject.is_empty() {
                return Some(subject.to_string());
            }
            return None;
        }
        self.codec.decode(token).ok().map(|claims| claims.sub)
    }

    /// Fast structural pre-check; no cryptography.
    #[must_use]
    pub fn validate_token_structure(&self, token: &str) -> bool {
        self.codec.validate_structure(token)
    }

    // Revocation ---------------------------------------------------------

    /// Blacklists a single token. Effective locally at once; propagated to
    /// the durable store in the background.
    pub fn blacklist_token(&self, token: &str) -> bool {
        self.blacklist.blacklist_token(token)
    }

    /// Blacklists every current and future token of a user.
    pub fn blacklist_user(&self, subject: &str) -> bool {
        self.blacklist.blacklist_user(subject)
    }

    /// Un-revokes a single token. Awaits the durable write.
    pub async fn remove_from_blacklist(&self, token: &str) -> bool {
        self.blacklist.remove_token(token).await
    }

    /// Un-revokes a user. Awaits the durable write.
    pub async fn remove_user_from_blacklist(&self, subject: &str) -> bool {
        self.blacklist.remove_user(subject).await
    }

    /// Checks whether a token is blacklisted.
    pub async fn is_token_blacklisted(&self, token: &str) -> bool {
        self.blacklist.is_token_blacklisted(token).await
    }

    /// Checks whether a user is blacklisted.
    pub async fn is_user_blacklisted(&self, subject: &str) -> bool {
        self.blacklist.is_user_blacklisted(subject).await
    }

    // Rotation -----------------------------------------------------------

    /// Exchanges a refresh token for a fresh access/refresh pair.
    ///
    /// The presented refresh token is consumed atomically; a second
    /// exchange with the same token fails, as does any concurrent race
    /// beyond the first winner. Identity claims carry over to the new
    /// pair. Returns `None` if the refresh token fails validation or was
    /// already consumed.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Option<TokenPair> {
        let validated = self
            .validate_token_for_consumption(refresh_token, TokenKind::Refresh)
            .await?;

        let subject = validated.claims.sub.as_str();
        let email = validated.claims.email.as_deref();
        let permissions = validated.claims.permissions.clone();

        match self.mint_pair(subject, email, permissions) {
            Ok(pair) => Some(pair),
            Err(e) => {
                warn!(error = %e, "failed to mint rotated token pair");
                None
            }
        }
    }

    fn mint_pair(
        &self,
        subject: &str,
        email: Option<&str>,
        permissions: Option<Vec<String>>,
    ) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.create_access_token(subject, email, permissions.clone())?,
            refresh_token: self.create_refresh_token(subject, email, permissions)?,
        })
    }

    // Observability ------------------------------------------------------

    /// Returns a counts-only operational snapshot.
    #[must_use]
    pub fn performance_stats(&self) -> PerformanceStats {
        PerformanceStats {
            tokens_issued: self.tokens_issued.load(Ordering::Relaxed),
            tokens_validated: self.tokens_validated.load(Ordering::Relaxed),
            tokens_rejected: self.tokens_rejected.load(Ordering::Relaxed),
            security_violations: self.security_violations.load(Ordering::Relaxed),
            mock_tokens_enabled: self.config.mock_tokens_allowed(),
            blacklist: self.blacklist.stats(),
            replay: self.replay.stats(),
        }
    }

    fn note_rejection(&self, reason: RejectReason, expected: TokenKind) {
        self.tokens_rejected.fetch_add(1, Ordering::Relaxed);
        if reason.is_security_violation() {
            self.security_violations.fetch_add(1, Ordering::Relaxed);
            warn!(
                reason = reason.code(),
                expected_kind = %expected,
                "token rejected: security violation"
            );
        } else {
            debug!(reason = reason.code(), expected_kind = %expected, "token rejected");
        }
    }
}
