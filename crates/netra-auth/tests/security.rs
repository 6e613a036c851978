//! End-to-end security scenarios against the full handler pipeline.
//!
//! These tests exercise the paths an attacker actually probes: forged
//! headers, cross-secret and cross-environment tokens, replayed refresh
//! tokens, and revocation races, with the in-memory storage backend wired
//! in the way a single-instance deployment would wire it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use time::OffsetDateTime;

use netra_auth::{
    AuthConfig, AuthError, AuthResult, Environment, FailurePolicy, JwtHandler,
    RevocationSnapshot, RevocationStorage, SigningAlgorithm, SigningMaterial, TokenClaims,
    TokenCodec, TokenKind,
};
use netra_auth_memory::InMemoryRevocationStorage;

const SECRET: &[u8] = b"integration-secret-integration!!";

fn material() -> SigningMaterial {
    SigningMaterial::new(SECRET.to_vec(), SigningAlgorithm::HS256)
}

fn handler_with(config: AuthConfig) -> JwtHandler {
    JwtHandler::new(config, &material(), Arc::new(InMemoryRevocationStorage::new())).unwrap()
}

fn handler() -> JwtHandler {
    handler_with(AuthConfig::new(Environment::Test, "netra-backend"))
}

/// Codec sharing the handler's secret, for minting tampered-claims tokens
/// that carry a valid signature.
fn forge_codec() -> TokenCodec {
    TokenCodec::new(&material(), 60, 24 * 3600)
}

fn fresh_claims(kind: TokenKind) -> TokenClaims {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    TokenClaims::new(kind, "u1", now, now + 900, Environment::Test, "netra-backend")
}

#[tokio::test]
async fn garbage_input_never_panics_and_never_validates() {
    let handler = handler();
    let inputs = [
        "",
        " ",
        "garbage",
        "a.b",
        "a.b.c",
        "a.b.c.d",
        "..",
        "...",
        "Bearer abc.def.ghi",
        "eyJhbGciOiJIUzI1NiJ9",
        "{\"alg\":\"HS256\"}.{}.sig",
        "\u{0}\u{1}.\u{2}.\u{3}",
        "𝕛𝕨𝕥.𝕛𝕨𝕥.𝕛𝕨𝕥",
    ];
    for kind in [TokenKind::Access, TokenKind::Refresh, TokenKind::Service] {
        for input in inputs {
            assert!(
                handler.validate_token(input, kind).await.is_none(),
                "accepted {input:?} as {kind}"
            );
        }
    }
}

#[tokio::test]
async fn none_and_foreign_algorithms_are_rejected() {
    let handler = handler();
    let claims = serde_json::to_vec(&fresh_claims(TokenKind::Access)).unwrap();
    let payload = URL_SAFE_NO_PAD.encode(&claims);

    for alg in ["none", "None", "NONE", "HS384", "HS512", "RS256", "ES256"] {
        let header = URL_SAFE_NO_PAD.encode(format!(r#"{{"alg":"{alg}","typ":"JWT"}}"#));
        let token = format!("{header}.{payload}.c2lnbmF0dXJl");
        assert!(
            handler.validate_token(&token, TokenKind::Access).await.is_none(),
            "accepted alg {alg}"
        );
    }
    assert!(handler.performance_stats().security_violations >= 7);
}

#[tokio::test]
async fn tokens_from_a_different_secret_are_rejected() {
    let signer = handler();
    let other = JwtHandler::new(
        AuthConfig::new(Environment::Test, "netra-backend"),
        &SigningMaterial::new(b"a-completely-different-secret!!!".to_vec(), SigningAlgorithm::HS256),
        Arc::new(InMemoryRevocationStorage::new()),
    )
    .unwrap();

    let token = signer.create_access_token("u1", None, None).unwrap();
    assert!(other.validate_token(&token, TokenKind::Access).await.is_none());
    assert!(signer.validate_token(&token, TokenKind::Access).await.is_some());
}

#[tokio::test]
async fn cross_environment_tokens_are_rejected() {
    let staging = handler_with(AuthConfig::new(Environment::Staging, "netra-backend"));
    let production = handler_with(AuthConfig::new(Environment::Production, "netra-backend"));

    let token = staging.create_access_token("u1", None, None).unwrap();
    assert!(production.validate_token(&token, TokenKind::Access).await.is_none());
    assert_eq!(production.performance_stats().security_violations, 1);
}

#[tokio::test]
async fn forged_issuer_and_audience_are_rejected() {
    let handler = handler();
    let codec = forge_codec();

    let mut claims = fresh_claims(TokenKind::Access);
    claims.iss = "netra-auth-service-impostor".to_string();
    let token = codec.encode(&claims).unwrap();
    assert!(handler.validate_token(&token, TokenKind::Access).await.is_none());

    let mut claims = fresh_claims(TokenKind::Access);
    claims.aud = "netra-admin".to_string();
    let token = codec.encode(&claims).unwrap();
    assert!(handler.validate_token(&token, TokenKind::Access).await.is_none());
}

#[tokio::test]
async fn future_and_stale_iat_are_rejected() {
    let handler = handler();
    let codec = forge_codec();
    let now = OffsetDateTime::now_utc().unix_timestamp();

    let mut claims = fresh_claims(TokenKind::Access);
    claims.iat = now + 300;
    claims.exp = now + 1200;
    let token = codec.encode(&claims).unwrap();
    assert!(handler.validate_token(&token, TokenKind::Access).await.is_none());

    // Stale iat with a far-future exp: the age ceiling still applies.
    let mut claims = fresh_claims(TokenKind::Access);
    claims.iat = now - 25 * 3600;
    claims.exp = now + 7 * 24 * 3600;
    let token = codec.encode(&claims).unwrap();
    assert!(handler.validate_token(&token, TokenKind::Access).await.is_none());
}

#[tokio::test]
async fn refresh_token_is_single_use() {
    let handler = handler();
    let refresh = handler
        .create_refresh_token("u1", Some("u1@x.com"), None)
        .unwrap();

    let first = handler.refresh_access_token(&refresh).await;
    assert!(first.is_some());
    let second = handler.refresh_access_token(&refresh).await;
    assert!(second.is_none());
    assert_eq!(handler.performance_stats().replay.replays_blocked, 1);
}

#[tokio::test]
async fn concurrent_refresh_rotation_has_exactly_one_winner() {
    let handler = Arc::new(handler());
    let refresh = handler.create_refresh_token("u1", None, None).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let handler = Arc::clone(&handler);
        let token = refresh.clone();
        handles.push(tokio::spawn(async move {
            handler.refresh_access_token(&token).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn blacklist_round_trip_restores_the_token() {
    let handler = handler();
    let token = handler.create_access_token("u1", None, None).unwrap();

    assert!(handler.validate_token(&token, TokenKind::Access).await.is_some());
    assert!(handler.blacklist_token(&token));
    assert!(handler.is_token_blacklisted(&token).await);
    assert!(handler.validate_token(&token, TokenKind::Access).await.is_none());

    // Let the background persistence write land before un-revoking.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handler.remove_from_blacklist(&token).await);
    assert!(!handler.is_token_blacklisted(&token).await);
    assert!(handler.validate_token(&token, TokenKind::Access).await.is_some());
}

#[tokio::test]
async fn user_revocation_covers_all_their_tokens() {
    let handler = handler();
    let access = handler.create_access_token("u1", None, None).unwrap();
    let refresh = handler.create_refresh_token("u1", None, None).unwrap();

    handler.blacklist_user("u1");
    assert!(handler.validate_token(&access, TokenKind::Access).await.is_none());
    assert!(handler.refresh_access_token(&refresh).await.is_none());

    // Tokens issued after revocation are also dead until the user is
    // restored.
    let newer = handler.create_access_token("u1", None, None).unwrap();
    assert!(handler.validate_token(&newer, TokenKind::Access).await.is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(handler.remove_user_from_blacklist("u1").await);
    assert!(handler.validate_token(&newer, TokenKind::Access).await.is_some());
}

#[tokio::test]
async fn revocation_survives_a_restart_via_snapshot_sync() {
    let storage: Arc<dyn RevocationStorage> = Arc::new(InMemoryRevocationStorage::new());

    let first = JwtHandler::new(
        AuthConfig::new(Environment::Test, "netra-backend"),
        &material(),
        Arc::clone(&storage),
    )
    .unwrap();
    let token = first.create_access_token("u1", None, None).unwrap();
    first.blacklist_token(&token);
    // Let the background persistence task land.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = JwtHandler::new(
        AuthConfig::new(Environment::Test, "netra-backend"),
        &material(),
        storage,
    )
    .unwrap();
    second.sync_blacklist().await.unwrap();
    assert!(second.validate_token(&token, TokenKind::Access).await.is_none());
}

/// Storage stub whose every operation fails, simulating a durable-store
/// outage.
struct BrokenStorage;

#[async_trait]
impl RevocationStorage for BrokenStorage {
    async fn add_token(&self, _: &str, _: OffsetDateTime) -> AuthResult<()> {
        Err(AuthError::storage("down"))
    }
    async fn remove_token(&self, _: &str) -> AuthResult<()> {
        Err(AuthError::storage("down"))
    }
    async fn is_token_revoked(&self, _: &str) -> AuthResult<bool> {
        Err(AuthError::storage("down"))
    }
    async fn add_subject(&self, _: &str, _: OffsetDateTime) -> AuthResult<()> {
        Err(AuthError::storage("down"))
    }
    async fn remove_subject(&self, _: &str) -> AuthResult<()> {
        Err(AuthError::storage("down"))
    }
    async fn is_subject_revoked(&self, _: &str) -> AuthResult<bool> {
        Err(AuthError::storage("down"))
    }
    async fn load_snapshot(&self) -> AuthResult<RevocationSnapshot> {
        Err(AuthError::storage("down"))
    }
    async fn cleanup_expired(&self) -> AuthResult<u64> {
        Err(AuthError::storage("down"))
    }
}

#[tokio::test]
async fn store_outage_fail_open_keeps_authentication_available() {
    let handler = JwtHandler::new(
        AuthConfig::new(Environment::Test, "netra-backend")
            .with_failure_policy(FailurePolicy::FailOpen),
        &material(),
        Arc::new(BrokenStorage),
    )
    .unwrap();

    let token = handler.create_access_token("u1", None, None).unwrap();
    assert!(handler.validate_token(&token, TokenKind::Access).await.is_some());

    // Local revocations still hold through the memory tier.
    handler.blacklist_token(&token);
    assert!(handler.validate_token(&token, TokenKind::Access).await.is_none());
}

#[tokio::test]
async fn store_outage_fail_closed_rejects_everything() {
    let handler = JwtHandler::new(
        AuthConfig::new(Environment::Test, "netra-backend")
            .with_failure_policy(FailurePolicy::FailClosed),
        &material(),
        Arc::new(BrokenStorage),
    )
    .unwrap();

    let token = handler.create_access_token("u1", None, None).unwrap();
    assert!(handler.validate_token(&token, TokenKind::Access).await.is_none());
}

#[tokio::test]
async fn mock_tokens_are_inert_outside_test_mode() {
    let strict = handler();
    assert!(strict.validate_token("mock_admin", TokenKind::Access).await.is_none());
    assert!(strict.extract_user_id("mock_admin").is_none());

    let prod = handler_with(
        AuthConfig::new(Environment::Production, "netra-backend").with_test_mode(true),
    );
    assert!(prod.validate_token("mock_admin", TokenKind::Access).await.is_none());

    let permissive =
        handler_with(AuthConfig::new(Environment::Test, "netra-backend").with_test_mode(true));
    let validated = permissive
        .validate_token("mock_admin", TokenKind::Access)
        .await
        .unwrap();
    assert_eq!(validated.subject(), "admin");
}

#[tokio::test]
async fn cross_service_tokens_need_the_explicit_single_use_path() {
    let issuer = handler_with(AuthConfig::new(Environment::Test, "netra-auth"));
    let consumer = handler_with(AuthConfig::new(Environment::Test, "netra-backend"));

    let token = issuer.create_service_token("netra-worker", "Worker").unwrap();

    // The general validation path keeps the service-id binding.
    assert!(consumer.validate_token(&token, TokenKind::Service).await.is_none());

    // The dedicated path accepts the foreign token exactly once.
    assert!(consumer.validate_cross_service_token(&token).await.is_some());
    assert!(consumer.validate_cross_service_token(&token).await.is_none());
}

#[tokio::test]
async fn service_tokens_do_not_pass_as_user_tokens() {
    let handler = handler();
    let service = handler.create_service_token("netra-worker", "Worker").unwrap();

    assert!(handler.validate_token(&service, TokenKind::Access).await.is_none());
    assert!(handler.validate_token(&service, TokenKind::Refresh).await.is_none());
    assert!(handler.validate_token(&service, TokenKind::Service).await.is_some());
}
