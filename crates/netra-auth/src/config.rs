//! Authentication configuration.
//!
//! All tunables for the token lifecycle live here: deployment environment,
//! token lifetimes, timing tolerances, replay-guard capacity, and the
//! fail-open/fail-closed policy for durable-store outages.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::secret::SigningAlgorithm;

/// Deployment environment a process runs in.
///
/// The environment is bound into every issued token (`env` claim) and must
/// match the validating process's own environment, preventing a token minted
/// in staging from being replayed against production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    Development,
    /// Automated test runs.
    Test,
    /// Pre-production staging.
    Staging,
    /// Production.
    Production,
}

impl Environment {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// Returns `true` for environments where the strict secret policy
    /// applies and development conveniences are disabled.
    #[must_use]
    pub fn is_production_like(&self) -> bool {
        matches!(self, Self::Staging | Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" | "testing" => Ok(Self::Test),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// What a blacklist check should do when the durable store is unreachable.
///
/// `FailOpen` keeps authentication available during a store outage (the
/// in-memory tier still enforces same-process revocations) at the cost of
/// possibly missing a revocation made on another instance. `FailClosed`
/// treats uncertainty as revoked. Both are deliberate, documented postures;
/// high-security deployments should pick `FailClosed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Treat an unanswerable blacklist check as "not blacklisted".
    FailOpen,
    /// Treat an unanswerable blacklist check as "blacklisted".
    FailClosed,
}

/// Root configuration for the JWT handler.
///
/// # Example (TOML)
///
/// ```toml
/// environment = "production"
/// service_id = "netra-backend"
/// access_token_lifetime = "15m"
/// refresh_token_lifetime = "7d"
/// failure_policy = "fail_closed"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Deployment environment of this process.
    pub environment: Environment,

    /// Identifier of this service instance, bound into issued tokens as the
    /// `service_id` claim.
    pub service_id: String,

    /// Signing algorithm. Only the HMAC family is supported; the default
    /// is HS256.
    pub algorithm: SigningAlgorithm,

    /// Access token lifetime. Short by design; clients refresh.
    #[serde(with = "humantime_serde")]
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime. This is also the TTL ceiling used when
    /// persisting blacklist entries: no token can outlive it.
    #[serde(with = "humantime_serde")]
    pub refresh_token_lifetime: Duration,

    /// Service (machine-to-machine) token lifetime.
    #[serde(with = "humantime_serde")]
    pub service_token_lifetime: Duration,

    /// Clock-skew tolerance applied to `exp` and future-`iat` checks.
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,

    /// Maximum accepted token age measured from `iat`, regardless of `exp`.
    /// Closes the loophole where a very long `exp` masks a stale `iat`.
    #[serde(with = "humantime_serde")]
    pub max_token_age: Duration,

    /// Maximum number of consumed token ids tracked by the replay guard
    /// before a cleanup pass runs.
    pub replay_capacity: usize,

    /// Require a `jti` claim on every internal token. Disabling this trades
    /// replay-audit granularity for throughput on the validation fast path;
    /// identity and timing checks still apply either way.
    pub require_jti: bool,

    /// Blacklist behavior when the durable store cannot be reached.
    pub failure_policy: FailurePolicy,

    /// Accept `mock_`-prefixed test tokens. Only honored in development and
    /// test environments; production-like environments reject mock tokens
    /// unconditionally regardless of this flag.
    pub test_mode: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            service_id: "netra-service".to_string(),
            algorithm: SigningAlgorithm::HS256,
            access_token_lifetime: Duration::from_secs(15 * 60),
            refresh_token_lifetime: Duration::from_secs(7 * 24 * 3600),
            service_token_lifetime: Duration::from_secs(30 * 60),
            clock_skew: Duration::from_secs(60),
            max_token_age: Duration::from_secs(24 * 3600),
            replay_capacity: 10_000,
            require_jti: true,
            failure_policy: FailurePolicy::FailOpen,
            test_mode: false,
        }
    }
}

impl AuthConfig {
    /// Creates a configuration for the given environment and service id
    /// with defaults for everything else.
    #[must_use]
    pub fn new(environment: Environment, service_id: impl Into<String>) -> Self {
        Self {
            environment,
            service_id: service_id.into(),
            ..Self::default()
        }
    }

    /// Sets the access token lifetime.
    #[must_use]
    pub fn with_access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }

    /// Sets the refresh token lifetime.
    #[must_use]
    pub fn with_refresh_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.refresh_token_lifetime = lifetime;
        self
    }

    /// Sets the service token lifetime.
    #[must_use]
    pub fn with_service_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.service_token_lifetime = lifetime;
        self
    }

    /// Sets whether every internal token must carry a `jti`.
    #[must_use]
    pub fn with_require_jti(mut self, require: bool) -> Self {
        self.require_jti = require;
        self
    }

    /// Sets the durable-store failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Enables acceptance of mock test tokens. Has no effect outside
    /// development/test environments.
    #[must_use]
    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    /// Returns `true` if mock tokens are accepted under this configuration.
    #[must_use]
    pub fn mock_tokens_allowed(&self) -> bool {
        self.test_mode && !self.environment.is_production_like()
    }
}
