//! JWT encoding, structural validation, and verified decoding.
//!
//! Validation is layered cheapest-first:
//!
//! 1. [`TokenCodec::validate_structure`]: pure string/base64/JSON checks,
//!    no crypto. A flood of garbage tokens never reaches signature code.
//! 2. An explicit header-algorithm check against the pinned algorithm. The
//!    `alg` field in the token header is never trusted to *select* the
//!    verification algorithm; it is only compared against the configured
//!    one, which defeats algorithm-confusion and `"none"` attacks.
//! 3. Signature verification and timing checks via `jsonwebtoken`.
//!
//! Nothing in this module panics on attacker-controlled input; every
//! failure maps to a [`RejectReason`].

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;

use crate::claims::{IdTokenClaims, TokenClaims};
use crate::error::{AuthError, RejectReason};
use crate::secret::{SigningAlgorithm, SigningMaterial};

/// Upper bound on accepted token length. Anything longer is rejected
/// before any decoding work, bounding processing time on hostile input.
pub const MAX_TOKEN_LEN: usize = 16 * 1024;

/// Encodes and decodes JWTs under one fixed secret and algorithm.
///
/// Thread-safe (`Send + Sync`); shared across request tasks behind the
/// handler.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: SigningAlgorithm,
    clock_skew_secs: i64,
    max_token_age_secs: i64,
}

impl TokenCodec {
    /// Creates a codec from resolved signing material.
    #[must_use]
    pub fn new(material: &SigningMaterial, clock_skew_secs: i64, max_token_age_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(material.secret()),
            decoding_key: DecodingKey::from_secret(material.secret()),
            algorithm: material.algorithm(),
            clock_skew_secs,
            max_token_age_secs,
        }
    }

    /// Returns the pinned algorithm.
    #[must_use]
    pub fn algorithm(&self) -> SigningAlgorithm {
        self.algorithm
    }

    /// Encodes claims into a signed token string.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Encoding`] if serialization fails.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        let header = Header::new(self.algorithm.to_jwt_algorithm());
        encode(&header, claims, &self.encoding_key).map_err(|e| AuthError::encoding(e.to_string()))
    }

    /// Fast, pre-cryptographic structural check.
    ///
    /// Returns `true` only if the string splits into exactly three
    /// non-empty dot-separated segments, every segment is valid base64url,
    /// and the first two decode to JSON objects. Never panics, never
    /// errors; any violation is simply `false`.
    #[must_use]
    pub fn validate_structure(&self, token: &str) -> bool {
        Self::structure_of(token).is_some()
    }

    /// Decodes the header and payload segments without any cryptographic
    /// work. `None` on any structural violation.
    fn structure_of(token: &str) -> Option<(serde_json::Value, Vec<u8>)> {
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return None;
        }

        let mut segments = token.split('.');
        let (header, payload, signature) = (segments.next()?, segments.next()?, segments.next()?);
        if segments.next().is_some() {
            return None;
        }
        if header.is_empty() || payload.is_empty() || signature.is_empty() {
            return None;
        }

        let header_bytes = URL_SAFE_NO_PAD.decode(header).ok()?;
        let payload_bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
        URL_SAFE_NO_PAD.decode(signature).ok()?;

        let header_json: serde_json::Value = serde_json::from_slice(&header_bytes).ok()?;
        if !header_json.is_object() {
            return None;
        }
        let payload_json: serde_json::Value = serde_json::from_slice(&payload_bytes).ok()?;
        if !payload_json.is_object() {
            return None;
        }

        Some((header_json, payload_bytes))
    }

    /// Checks the header's `alg` against the pinned algorithm.
    ///
    /// The configured algorithm is the only one ever used for
    /// verification; this check exists to classify mismatches (including
    /// `"none"`) as [`RejectReason::AlgorithmRejected`] before the
    /// signature path runs.
    fn check_header_algorithm(&self, header: &serde_json::Value) -> Result<(), RejectReason> {
        match header.get("alg").and_then(|v| v.as_str()) {
            Some(alg) if alg == self.algorithm.as_str() => Ok(()),
            _ => Err(RejectReason::AlgorithmRejected),
        }
    }

    /// Decodes and fully verifies a token: structure, pinned-algorithm
    /// signature, `exp`, future-`iat` skew, and the max-age ceiling.
    ///
    /// # Errors
    ///
    /// Returns a [`RejectReason`] on any failure; never panics.
    pub fn decode(&self, token: &str) -> Result<TokenClaims, RejectReason> {
        let claims: TokenClaims = self.decode_verified(token)?;
        self.check_timing(claims.iat)?;
        Ok(claims)
    }

    fn decode_verified<T: DeserializeOwned>(&self, token: &str) -> Result<T, RejectReason> {
        let (header, _) = Self::structure_of(token).ok_or(RejectReason::Malformed)?;
        self.check_header_algorithm(&header)?;

        let mut validation = Validation::new(self.algorithm.to_jwt_algorithm());
        validation.leeway = self.clock_skew_secs.max(0) as u64;
        validation.validate_exp = true;
        validation.validate_aud = false; // Audience is policy, not codec.

        let data = decode::<T>(token, &self.decoding_key, &validation)
            .map_err(Self::map_decode_error)?;
        Ok(data.claims)
    }

    fn map_decode_error(err: jsonwebtoken::errors::Error) -> RejectReason {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => RejectReason::Expired,
            ErrorKind::InvalidSignature => RejectReason::InvalidSignature,
            ErrorKind::ImmatureSignature => RejectReason::IssuedInFuture,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => RejectReason::AlgorithmRejected,
            ErrorKind::MissingRequiredClaim(_) => RejectReason::MissingClaim,
            _ => RejectReason::Malformed,
        }
    }

    /// Applies the `iat` checks that `jsonwebtoken` does not cover: a
    /// future `iat` beyond skew tolerance, and the max-age ceiling that
    /// holds regardless of `exp`.
    fn check_timing(&self, iat: i64) -> Result<(), RejectReason> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        if iat > now + self.clock_skew_secs {
            return Err(RejectReason::IssuedInFuture);
        }
        if now - iat > self.max_token_age_secs {
            return Err(RejectReason::TooOld);
        }
        Ok(())
    }

    /// Decodes an externally issued ID token's payload without verifying
    /// its signature.
    ///
    /// Third-party tokens are signed with the provider's keys, which this
    /// handler does not hold; signature verification against provider JWKS
    /// happens in the OAuth exchange layer. This path still enforces
    /// structure, rejects a `"none"` algorithm header, and applies the
    /// same timing checks as the verified path. It must never be used for
    /// internal tokens.
    pub fn decode_id_token_unverified(&self, token: &str) -> Result<IdTokenClaims, RejectReason> {
        let (header, payload) = Self::structure_of(token).ok_or(RejectReason::Malformed)?;

        match header.get("alg").and_then(|v| v.as_str()) {
            None => return Err(RejectReason::AlgorithmRejected),
            Some(alg) if alg.eq_ignore_ascii_case("none") => {
                return Err(RejectReason::AlgorithmRejected);
            }
            Some(_) => {}
        }

        let claims: IdTokenClaims =
            serde_json::from_slice(&payload).map_err(|_| RejectReason::Malformed)?;

        let now = OffsetDateTime::now_utc().unix_timestamp();
        if claims.exp <= now - self.clock_skew_secs {
            return Err(RejectReason::Expired);
        }
        self.check_timing(claims.iat)?;
        Ok(claims)
    }
}
