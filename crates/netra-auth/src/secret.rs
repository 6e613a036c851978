//! Signing-secret resolution.
//!
//! The handler fixes its signing material exactly once, at construction.
//! Candidate secret names are tried in descending priority (the
//! environment-specific variable, then the generic canonical name, then the
//! legacy name) against an abstract key-value [`SecretSource`] so that env
//! vars, secret managers, and test fixtures all plug in the same way.
//!
//! # Strictness
//!
//! In production and staging a missing or short secret is a fatal
//! [`AuthError::Configuration`]: it is better to fail to deploy than to run
//! trust-boundary code with a guessable secret. Development and test fall
//! back to a freshly generated throwaway secret and log a warning.

use std::fmt;

use jsonwebtoken::Algorithm;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Environment;
use crate::error::AuthError;

/// Minimum accepted secret length in production-like environments.
pub const MIN_SECRET_LEN: usize = 32;

/// Environment-specific secret variable prefix; the environment name is
/// appended in uppercase (e.g. `NETRA_JWT_SECRET_PRODUCTION`).
pub const ENV_SPECIFIC_SECRET_PREFIX: &str = "NETRA_JWT_SECRET_";

/// Generic canonical secret variable name.
pub const GENERIC_SECRET_NAME: &str = "NETRA_JWT_SECRET";

/// Legacy secret variable name, still honored at lowest priority.
pub const LEGACY_SECRET_NAME: &str = "JWT_SECRET_KEY";

/// Supported signing algorithms.
///
/// Only the HMAC family is supported; tokens carrying any other algorithm
/// in their header, including `"none"`, are rejected outright.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// HMAC with SHA-256 (default).
    #[default]
    HS256,
    /// HMAC with SHA-384.
    HS384,
    /// HMAC with SHA-512.
    HS512,
}

impl SigningAlgorithm {
    /// Converts to the `jsonwebtoken` Algorithm type.
    #[must_use]
    pub fn to_jwt_algorithm(self) -> Algorithm {
        match self {
            Self::HS256 => Algorithm::HS256,
            Self::HS384 => Algorithm::HS384,
            Self::HS512 => Algorithm::HS512,
        }
    }

    /// Returns the algorithm name as used in JWT headers.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HS256 => "HS256",
            Self::HS384 => "HS384",
            Self::HS512 => "HS512",
        }
    }

    /// Parses an algorithm name, rejecting anything outside the supported
    /// HMAC family.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] for unsupported names.
    pub fn parse(name: &str) -> Result<Self, AuthError> {
        match name {
            "HS256" => Ok(Self::HS256),
            "HS384" => Ok(Self::HS384),
            "HS512" => Ok(Self::HS512),
            other => Err(AuthError::configuration(format!(
                "unsupported signing algorithm: {other}"
            ))),
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Abstract key-value lookup for secret candidates.
///
/// Implementations may read process environment variables, a secret
/// manager, or a fixed map in tests. Empty values are treated as absent.
pub trait SecretSource {
    /// Looks up a candidate secret by name.
    fn get(&self, name: &str) -> Option<String>;
}

/// [`SecretSource`] backed by process environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvVarSource;

impl SecretSource for EnvVarSource {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Resolved signing material: the secret bytes and the pinned algorithm.
///
/// `Debug` is redacted; the secret never appears in logs or errors.
#[derive(Clone)]
pub struct SigningMaterial {
    secret: Vec<u8>,
    algorithm: SigningAlgorithm,
}

impl SigningMaterial {
    /// Creates signing material from raw secret bytes.
    #[must_use]
    pub fn new(secret: impl Into<Vec<u8>>, algorithm: SigningAlgorithm) -> Self {
        Self {
            secret: secret.into(),
            algorithm,
        }
    }

    /// Returns the secret bytes.
    #[must_use]
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    /// Returns the pinned algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }
}

impl fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningMaterial")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Resolves signing material from a layered secret source with
/// environment-scaled strictness.
pub struct SecretResolver {
    environment: Environment,
    algorithm: SigningAlgorithm,
}

impl SecretResolver {
    /// Creates a resolver for the given environment and algorithm.
    #[must_use]
    pub fn new(environment: Environment, algorithm: SigningAlgorithm) -> Self {
        Self {
            environment,
            algorithm,
        }
    }

    /// Resolves the signing secret from the source.
    ///
    /// Candidates are tried in descending priority:
    /// environment-specific name, generic canonical name, legacy name.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] in production/staging when no
    /// candidate resolves to a non-empty value of at least
    /// [`MIN_SECRET_LEN`] characters.
    pub fn resolve(&self, source: &dyn SecretSource) -> Result<SigningMaterial, AuthError> {
        let env_specific = format!(
            "{}{}",
            ENV_SPECIFIC_SECRET_PREFIX,
            self.environment.as_str().to_ascii_uppercase()
        );

        let candidates = [env_specific.as_str(), GENERIC_SECRET_NAME, LEGACY_SECRET_NAME];
        for name in candidates {
            if let Some(value) = source.get(name) {
                if value.is_empty() {
                    continue;
                }
                if value.len() < MIN_SECRET_LEN {
                    if self.environment.is_production_like() {
                        return Err(AuthError::configuration(format!(
                            "secret from {name} is shorter than {MIN_SECRET_LEN} characters"
                        )));
                    }
                    warn!(
                        source = name,
                        environment = %self.environment,
                        "signing secret is shorter than the recommended minimum"
                    );
                }
                return Ok(SigningMaterial::new(value.into_bytes(), self.algorithm));
            }
        }

        if self.environment.is_production_like() {
            return Err(AuthError::configuration(format!(
                "no signing secret configured for {} (checked {env_specific}, \
                 {GENERIC_SECRET_NAME}, {LEGACY_SECRET_NAME})",
                self.environment
            )));
        }

        // Dev/test fallback: a throwaway secret keeps local iteration fast
        // without weakening production posture.
        let bytes: [u8; 32] = rand::thread_rng().r#gen();
        let generated = format!("devsecret_{}", hex::encode(bytes));
        warn!(
            environment = %self.environment,
            "no signing secret configured; generated a development-only secret"
        );
        Ok(SigningMaterial::new(generated.into_bytes(), self.algorithm))
    }
}
