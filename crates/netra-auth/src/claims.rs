//! Token claims, kinds, and the semantic claims policy.
//!
//! The codec guarantees structure and signature; this module decides whether
//! a structurally valid, signature-verified claims set is actually acceptable
//! for the kind the caller expects: kind match, issuer, audience,
//! environment binding, service binding, and `jti` presence. On acceptance
//! the policy attaches a service signature that lets a second-hop consumer
//! assert the token already passed policy without re-deriving trust.

use std::fmt;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::config::Environment;
use crate::error::RejectReason;

type HmacSha256 = Hmac<Sha256>;

/// Fixed issuer string for every token this system mints.
pub const ISSUER: &str = "netra-auth-service";

/// Audience for end-user access and refresh tokens.
pub const AUDIENCE_PLATFORM: &str = "netra-platform";

/// Audience for service-to-service tokens.
pub const AUDIENCE_SERVICES: &str = "netra-services";

/// Domain-separation prefix for service signatures.
const SERVICE_SIGNATURE_PREFIX: &str = "netra-sig:v1";

/// The kind of a token, carried in the `token_type` claim.
///
/// Each kind has its own audience, expiry policy, and required claims.
/// Kind is checked structurally before anything else kind-specific; an
/// access token presented where a refresh token is expected is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Short-lived end-user token for API calls.
    Access,
    /// Long-lived single-use token exchanged for a fresh access token.
    Refresh,
    /// Machine identity token for service-to-service calls.
    Service,
    /// Externally issued OAuth ID token (third-party issuer).
    ExternalId,
}

impl TokenKind {
    /// Returns the audience this kind must carry, or `None` for
    /// externally issued tokens whose audience is provider-specific.
    #[must_use]
    pub fn audience(&self) -> Option<&'static str> {
        match self {
            Self::Access | Self::Refresh => Some(AUDIENCE_PLATFORM),
            Self::Service => Some(AUDIENCE_SERVICES),
            Self::ExternalId => None,
        }
    }

    /// Returns the canonical claim value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
            Self::Service => "service",
            Self::ExternalId => "external_id",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Claims carried by every internally issued token.
///
/// Unknown additional claims in incoming tokens are ignored on decode for
/// forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    /// Issuer; always [`ISSUER`] for internal tokens.
    pub iss: String,

    /// Subject: user id or service id. Non-empty.
    pub sub: String,

    /// Audience, fixed per kind.
    pub aud: String,

    /// Expiration time (Unix timestamp, seconds).
    pub exp: i64,

    /// Issued at (Unix timestamp, seconds).
    pub iat: i64,

    /// Token kind.
    pub token_type: TokenKind,

    /// Unique token id for replay protection and targeted revocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Deployment environment the token was issued in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,

    /// Identifier of the issuing service instance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,

    /// Human-readable service name (service tokens only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,

    /// User email (access/refresh tokens).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Authorization scopes (access/refresh tokens).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

impl TokenClaims {
    /// Creates a claims set for a new token of the given kind.
    ///
    /// The audience is derived from the kind; `jti` is a fresh UUID.
    #[must_use]
    pub fn new(
        kind: TokenKind,
        subject: impl Into<String>,
        iat: i64,
        exp: i64,
        environment: Environment,
        service_id: impl Into<String>,
    ) -> Self {
        Self {
            iss: ISSUER.to_string(),
            sub: subject.into(),
            aud: kind.audience().unwrap_or(AUDIENCE_PLATFORM).to_string(),
            exp,
            iat,
            token_type: kind,
            jti: Some(Uuid::new_v4().to_string()),
            env: Some(environment.as_str().to_string()),
            service_id: Some(service_id.into()),
            service_name: None,
            email: None,
            permissions: None,
        }
    }
}

/// Claims of an externally issued OAuth ID token.
///
/// A deliberately narrower shape than [`TokenClaims`]: third-party tokens
/// carry no `token_type`, and this system's audience/service claims do not
/// apply to them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdTokenClaims {
    /// Third-party issuer.
    pub iss: String,

    /// Subject at the external provider.
    pub sub: String,

    /// Expiration time (Unix timestamp, seconds).
    pub exp: i64,

    /// Issued at (Unix timestamp, seconds).
    pub iat: i64,

    /// Email, when the provider includes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Whether a validation runs on the standard path or the cross-service
/// path, which has its own replay-protected logic and therefore relaxes the
/// service-id binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationContext {
    /// Ordinary first-hop validation.
    Standard,
    /// Validation of a token minted by a different service instance.
    CrossService,
}

/// A claims set that passed policy, with the service signature attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedClaims {
    /// The verified claims.
    pub claims: TokenClaims,

    /// HMAC over a canonical claims subset, asserting first-hop validation
    /// to downstream consumers.
    pub service_signature: String,
}

impl ValidatedClaims {
    /// Returns the subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }

    /// Returns the permissions, empty if absent.
    #[must_use]
    pub fn permissions(&self) -> &[String] {
        self.claims.permissions.as_deref().unwrap_or_default()
    }
}

/// Enforces the kind-dependent semantic constraints on verified claims.
pub struct ClaimsPolicy {
    environment: Environment,
    service_id: String,
    service_secret: Vec<u8>,
    require_jti: bool,
}

impl ClaimsPolicy {
    /// Creates a policy bound to this process's environment and service id.
    ///
    /// `service_secret` keys the service signature; it differs per
    /// deployment and is typically the signing secret.
    #[must_use]
    pub fn new(
        environment: Environment,
        service_id: impl Into<String>,
        service_secret: impl Into<Vec<u8>>,
        require_jti: bool,
    ) -> Self {
        Self {
            environment,
            service_id: service_id.into(),
            service_secret: service_secret.into(),
            require_jti,
        }
    }

    /// Validates verified claims against the expected kind.
    ///
    /// # Errors
    ///
    /// Returns the first failing [`RejectReason`]; checks run in a fixed
    /// order so rejection codes are stable.
    pub fn validate(
        &self,
        claims: &TokenClaims,
        expected: TokenKind,
        context: ValidationContext,
    ) -> Result<ValidatedClaims, RejectReason> {
        if claims.token_type != expected {
            return Err(RejectReason::WrongKind);
        }

        if claims.sub.is_empty() {
            return Err(RejectReason::MissingClaim);
        }

        if claims.iss != ISSUER {
            return Err(RejectReason::WrongIssuer);
        }

        if let Some(expected_aud) = expected.audience() {
            if claims.aud != expected_aud && !self.development_audience_allowed(&claims.aud) {
                return Err(RejectReason::WrongAudience);
            }
        }

        if let Some(env) = &claims.env {
            if env != self.environment.as_str() {
                return Err(RejectReason::EnvironmentMismatch);
            }
        }

        if let Some(service_id) = &claims.service_id {
            if *service_id != self.service_id && context != ValidationContext::CrossService {
                return Err(RejectReason::ServiceMismatch);
            }
        }

        if self.require_jti && claims.jti.is_none() {
            return Err(RejectReason::MissingClaim);
        }

        Ok(ValidatedClaims {
            service_signature: self.service_signature(claims),
            claims: claims.clone(),
        })
    }

    /// Development carve-out: an audience equal to the environment name is
    /// accepted to support local multi-service testing. Never applies
    /// outside development.
    fn development_audience_allowed(&self, aud: &str) -> bool {
        self.environment == Environment::Development && aud == self.environment.as_str()
    }

    /// Computes the service signature over the canonical claims subset.
    ///
    /// The projection is fixed and ordered: subject, issuer, audience,
    /// this validator's service id, expiry. Changing it breaks downstream
    /// verifiers.
    #[must_use]
    pub fn service_signature(&self, claims: &TokenClaims) -> String {
        let canonical = format!(
            "{SERVICE_SIGNATURE_PREFIX}|{}|{}|{}|{}|{}",
            claims.sub, claims.iss, claims.aud, self.service_id, claims.exp
        );

        let mut mac = HmacSha256::new_from_slice(&self.service_secret)
            .expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
