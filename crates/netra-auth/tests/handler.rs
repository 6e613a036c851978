//! Handler lifecycle tests with the in-memory storage backend wired in.

use std::sync::Arc;

use time::OffsetDateTime;

use netra_auth::{
    AuthConfig, Environment, JwtHandler, SigningAlgorithm, SigningMaterial, TokenKind,
};
use netra_auth_memory::InMemoryRevocationStorage;

fn material() -> SigningMaterial {
    SigningMaterial::new(
        b"handler-test-secret-handler-test!".to_vec(),
        SigningAlgorithm::HS256,
    )
}

fn handler_with(config: AuthConfig) -> JwtHandler {
    JwtHandler::new(config, &material(), Arc::new(InMemoryRevocationStorage::new())).unwrap()
}

fn handler() -> JwtHandler {
    handler_with(AuthConfig::new(Environment::Test, "netra-backend"))
}

#[tokio::test]
async fn test_access_token_round_trip() {
    let handler = handler();
    let token = handler
        .create_access_token("u1", Some("u1@x.com"), Some(vec!["read".to_string()]))
        .unwrap();

    let validated = handler.validate_token(&token, TokenKind::Access).await.unwrap();
    assert_eq!(validated.subject(), "u1");
    assert_eq!(validated.claims.email.as_deref(), Some("u1@x.com"));
    assert_eq!(validated.permissions(), ["read".to_string()]);
    assert!(!validated.service_signature.is_empty());
}

#[tokio::test]
async fn test_kind_confusion_rejected() {
    let handler = handler();
    let access = handler.create_access_token("u1", None, None).unwrap();
    let refresh = handler.create_refresh_token("u1", None, None).unwrap();

    assert!(handler.validate_token(&access, TokenKind::Refresh).await.is_none());
    assert!(handler.validate_token(&refresh, TokenKind::Access).await.is_none());
}

#[tokio::test]
async fn test_foreign_service_token_needs_the_cross_service_path() {
    let issuer = handler_with(AuthConfig::new(Environment::Test, "netra-auth"));
    let consumer = handler_with(AuthConfig::new(Environment::Test, "netra-backend"));

    let token = issuer.create_service_token("netra-worker", "Worker").unwrap();

    // The standard path keeps the service-id binding.
    assert!(consumer.validate_token(&token, TokenKind::Service).await.is_none());

    let validated = consumer.validate_cross_service_token(&token).await.unwrap();
    assert_eq!(validated.subject(), "netra-worker");
    assert_eq!(validated.claims.service_name.as_deref(), Some("Worker"));
}

#[tokio::test]
async fn test_cross_service_token_is_single_use() {
    let issuer = handler_with(AuthConfig::new(Environment::Test, "netra-auth"));
    let consumer = handler_with(AuthConfig::new(Environment::Test, "netra-backend"));

    let token = issuer.create_service_token("netra-worker", "Worker").unwrap();
    assert!(consumer.validate_cross_service_token(&token).await.is_some());
    assert!(consumer.validate_cross_service_token(&token).await.is_none());
}

#[tokio::test]
async fn test_own_service_token_passes_the_standard_path() {
    let handler = handler();
    let token = handler.create_service_token("netra-worker", "Worker").unwrap();
    assert!(handler.validate_token(&token, TokenKind::Service).await.is_some());
}

#[tokio::test]
async fn test_garbage_input_yields_none() {
    let handler = handler();
    for garbage in ["", "x", "a.b.c", "..", "mock_", "not a token at all"] {
        assert!(handler.validate_token(garbage, TokenKind::Access).await.is_none());
    }
}

#[tokio::test]
async fn test_blacklisted_token_rejected() {
    let handler = handler();
    let token = handler.create_access_token("u1", None, None).unwrap();
    assert!(handler.validate_token(&token, TokenKind::Access).await.is_some());

    assert!(handler.blacklist_token(&token));
    assert!(handler.validate_token(&token, TokenKind::Access).await.is_none());

    // Let the background persistence write land before un-revoking.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(handler.remove_from_blacklist(&token).await);
    assert!(handler.validate_token(&token, TokenKind::Access).await.is_some());
}

#[tokio::test]
async fn test_blacklisted_user_rejected_across_tokens() {
    let handler = handler();
    let t1 = handler.create_access_token("u1", None, None).unwrap();
    let t2 = handler.create_refresh_token("u1", None, None).unwrap();

    handler.blacklist_user("u1");
    assert!(handler.validate_token(&t1, TokenKind::Access).await.is_none());
    assert!(handler.validate_token(&t2, TokenKind::Refresh).await.is_none());

    // Another user is unaffected.
    let t3 = handler.create_access_token("u2", None, None).unwrap();
    assert!(handler.validate_token(&t3, TokenKind::Access).await.is_some());
}

#[tokio::test]
async fn test_refresh_rotation_consumes_old_token() {
    let handler = handler();
    let refresh = handler
        .create_refresh_token("u1", Some("u1@x.com"), Some(vec!["read".to_string()]))
        .unwrap();

    let pair = handler.refresh_access_token(&refresh).await.unwrap();
    let validated = handler
        .validate_token(&pair.access_token, TokenKind::Access)
        .await
        .unwrap();
    assert_eq!(validated.subject(), "u1");
    assert_eq!(validated.claims.email.as_deref(), Some("u1@x.com"));

    // The consumed refresh token is dead; the new one works.
    assert!(handler.refresh_access_token(&refresh).await.is_none());
    assert!(handler.refresh_access_token(&pair.refresh_token).await.is_some());
}

#[tokio::test]
async fn test_concurrent_refresh_has_one_winner() {
    let handler = Arc::new(handler());
    let refresh = handler.create_refresh_token("u1", None, None).unwrap();

    let a = {
        let handler = Arc::clone(&handler);
        let token = refresh.clone();
        tokio::spawn(async move { handler.refresh_access_token(&token).await })
    };
    let b = {
        let handler = Arc::clone(&handler);
        let token = refresh.clone();
        tokio::spawn(async move { handler.refresh_access_token(&token).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
}

#[tokio::test]
async fn test_mock_token_gating() {
    let strict = handler();
    assert!(strict.validate_token("mock_u1", TokenKind::Access).await.is_none());
    assert!(strict.performance_stats().security_violations >= 1);

    let permissive = handler_with(
        AuthConfig::new(Environment::Test, "netra-backend").with_test_mode(true),
    );
    let validated = permissive.validate_token("mock_u1", TokenKind::Access).await.unwrap();
    assert_eq!(validated.subject(), "u1");

    // test_mode has no effect in production-like environments.
    let prod = handler_with(
        AuthConfig::new(Environment::Production, "netra-backend").with_test_mode(true),
    );
    assert!(prod.validate_token("mock_u1", TokenKind::Access).await.is_none());
}

#[tokio::test]
async fn test_extract_user_id() {
    let handler = handler();
    let token = handler.create_access_token("u1", None, None).unwrap();
    assert_eq!(handler.extract_user_id(&token).as_deref(), Some("u1"));
    assert!(handler.extract_user_id("garbage").is_none());
    assert!(handler.extract_user_id("mock_u1").is_none());

    let permissive = handler_with(
        AuthConfig::new(Environment::Test, "netra-backend").with_test_mode(true),
    );
    assert_eq!(permissive.extract_user_id("mock_u1").as_deref(), Some("u1"));
}

#[tokio::test]
async fn test_id_token_issuer_pinning() {
    use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

    let handler = handler();
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","kid":"g1"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({
            "iss": "https://accounts.google.com",
            "sub": "108",
            "exp": now + 3600,
            "iat": now
        })
        .to_string()
        .as_bytes(),
    );
    let token = format!("{header}.{payload}.c2ln");

    assert!(handler.validate_id_token(&token, None).is_some());
    assert!(
        handler
            .validate_id_token(&token, Some("https://accounts.google.com"))
            .is_some()
    );
    assert!(handler.validate_id_token(&token, Some("https://evil.example")).is_none());
}

#[tokio::test]
async fn test_stats_track_lifecycle() {
    let handler = handler();
    let token = handler.create_access_token("u1", None, None).unwrap();
    handler.validate_token(&token, TokenKind::Access).await;
    handler.validate_token("garbage", TokenKind::Access).await;

    let stats = handler.performance_stats();
    assert_eq!(stats.tokens_issued, 1);
    assert_eq!(stats.tokens_validated, 1);
    assert_eq!(stats.tokens_rejected, 1);
    assert!(!stats.mock_tokens_enabled);
}

#[test]
fn test_empty_service_id_rejected_at_construction() {
    let mut config = AuthConfig::new(Environment::Test, "x");
    config.service_id = String::new();
    let err = JwtHandler::new(
        config,
        &material(),
        Arc::new(InMemoryRevocationStorage::new()),
    )
    .unwrap_err();
    assert!(err.is_fatal());
}
