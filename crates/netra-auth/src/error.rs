//! Authentication error types and the rejection taxonomy.
//!
//! Two distinct families live here:
//!
//! - [`AuthError`] covers actual errors: broken configuration, storage
//!   outages, encoding failures. These are rare and propagate via `Result`.
//! - [`RejectReason`] says why a presented token failed validation. Rejections
//!   are an expected, frequent outcome and never surface as errors from the
//!   public API; callers see `None` while the reason feeds logging and
//!   counters internally.

use std::fmt;

/// Errors that can occur during handler construction and administrative
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The auth configuration is invalid. Fatal at construction time:
    /// a handler with a missing or weak trust root must not start.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An error occurred while reading from or writing to the durable
    /// revocation store.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Encoding` error.
    #[must_use]
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this error should prevent the service from
    /// starting.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns `true` if this is a transient infrastructure error.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

/// The reason a token failed validation.
///
/// Every rejection carries a machine-readable [`code`](Self::code) suitable
/// for a 401 response body. Reasons flagged as
/// [security violations](Self::is_security_violation) indicate likely attack
/// traffic rather than ordinary expiry and are counted separately so that
/// alerting can distinguish the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The string is not a structurally valid three-segment JWT.
    Malformed,
    /// The token header carries a different algorithm than the one this
    /// handler is pinned to, including `"none"`.
    AlgorithmRejected,
    /// The signature does not verify under the configured secret.
    InvalidSignature,
    /// The token's `exp` is in the past.
    Expired,
    /// The token's `iat` is further in the future than the clock-skew
    /// tolerance allows.
    IssuedInFuture,
    /// The token's `iat` is older than the maximum token age ceiling,
    /// regardless of `exp`.
    TooOld,
    /// The token's kind does not match the kind the caller expected.
    WrongKind,
    /// The `iss` claim does not match this auth system's issuer.
    WrongIssuer,
    /// The `aud` claim does not match the audience for the expected kind.
    WrongAudience,
    /// The token was issued for a different deployment environment.
    EnvironmentMismatch,
    /// The token was issued by a different service instance.
    ServiceMismatch,
    /// A claim required by policy is absent.
    MissingClaim,
    /// The token has been individually blacklisted.
    TokenBlacklisted,
    /// The token's subject has been blacklisted.
    SubjectBlacklisted,
    /// A single-use token was presented a second time.
    Replayed,
    /// A mock/test token was presented outside an enabled test mode.
    MockToken,
}

impl RejectReason {
    /// Returns the machine-readable reason code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::AlgorithmRejected => "algorithm_rejected",
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "expired",
            Self::IssuedInFuture => "issued_in_future",
            Self::TooOld => "too_old",
            Self::WrongKind => "wrong_kind",
            Self::WrongIssuer => "wrong_issuer",
            Self::WrongAudience => "wrong_audience",
            Self::EnvironmentMismatch => "environment_mismatch",
            Self::ServiceMismatch => "service_mismatch",
            Self::MissingClaim => "missing_claim",
            Self::TokenBlacklisted => "token_blacklisted",
            Self::SubjectBlacklisted => "subject_blacklisted",
            Self::Replayed => "replayed",
            Self::MockToken => "mock_token",
        }
    }

    /// Returns `true` if this rejection indicates a likely attack pattern
    /// rather than an ordinary client mistake or expiry.
    #[must_use]
    pub fn is_security_violation(&self) -> bool {
        matches!(
            self,
            Self::AlgorithmRejected
                | Self::EnvironmentMismatch
                | Self::ServiceMismatch
                | Self::Replayed
                | Self::MockToken
        )
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
