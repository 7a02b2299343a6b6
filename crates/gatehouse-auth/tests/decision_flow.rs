//! End-to-end decision tests
//!
//! Exercises the full state machine through the public API:
//! - priority between cached token, credential header and full verification
//! - authorization against token and user routes
//! - cache eviction and negative credential caching under real traffic
//! - internal faults collapsing into a generic decision
//! - concurrent decisions against one shared engine
//! - dot segments resolved before route matching

mod common;

use std::sync::Arc;

use common::{
    CountingBackend, FailingBackend, PanickingBackend, authenticator, config,
    config_with_token_cache, forge, request, seeded_backend, valid_claims,
};
use gatehouse_auth::credentials::HeaderCredentials;
use gatehouse_auth::decision::{INTERNAL_ERROR_MESSAGE, INVALID_TOKEN_MESSAGE};
use gatehouse_auth::token::ClaimExtensions;
use gatehouse_auth::{AuthMethod, Authenticator, MemoryBackend};
use serde_json::json;

fn admin_routes() -> Vec<String> {
    vec!["example.com/admin/*".to_string()]
}

#[tokio::test]
async fn test_alice_end_to_end() {
    // GIVEN: alice holds a one-hour session for the admin area
    let auth = authenticator().await;
    let token = auth
        .issue_token("alice", &admin_routes(), &ClaimExtensions::new())
        .unwrap()
        .token;

    // WHEN: she requests an admin page
    let decision = auth.decide(&request("/admin/x").with_token(token.clone())).await;

    // THEN: she is authenticated by full verification and authorized
    assert!(decision.is_authed);
    assert!(decision.is_authorized);
    assert_eq!(decision.method, Some(AuthMethod::Jwt));
    assert_eq!(decision.username.as_deref(), Some("alice"));
    assert_eq!(decision.matched_route.as_deref(), Some("example.com/admin/*"));
    assert_eq!(decision.error, None);
    assert_eq!(decision.payload.as_ref().unwrap().sub, "alice");

    // WHEN: she requests a public page with the same token
    let decision = auth.decide(&request("/public").with_token(token)).await;

    // THEN: identity comes from the cache, but the route does not match
    assert!(decision.is_authed);
    assert!(!decision.is_authorized);
    assert_eq!(decision.method, Some(AuthMethod::JwtCache));
    assert_eq!(decision.matched_route, None);
    assert!(decision.error.is_some());
}

#[tokio::test]
async fn test_valid_token_wins_over_invalid_header() {
    // GIVEN: a request with a bad credential header and a valid session cookie
    let auth = authenticator().await;
    let token = auth
        .issue_token("alice", &admin_routes(), &ClaimExtensions::new())
        .unwrap()
        .token;
    let bad_header = HeaderCredentials::encode("alice", "not-her-password");

    let decision = auth
        .decide(
            &request("/admin/x")
                .with_token(token)
                .with_credential(bad_header),
        )
        .await;

    // THEN: the token authenticates the request
    assert_eq!(decision.method, Some(AuthMethod::Jwt));
    assert!(decision.is_authed);
    assert!(decision.is_authorized);
    assert_eq!(decision.error, None);
}

#[tokio::test]
async fn test_cached_token_skips_header_check() {
    let backend = Arc::new(CountingBackend::default());
    backend
        .inner
        .put_user("alice", "wonderland", &["example.com/admin/*"])
        .await
        .unwrap();
    let auth = Authenticator::new(&config(), Arc::clone(&backend) as _).unwrap();

    let token = auth
        .issue_token("alice", &admin_routes(), &ClaimExtensions::new())
        .unwrap()
        .token;
    auth.decide(&request("/admin/x").with_token(token.clone())).await;

    let header = HeaderCredentials::encode("alice", "wonderland");
    let decision = auth
        .decide(&request("/admin/x").with_token(token).with_credential(header))
        .await;

    assert_eq!(decision.method, Some(AuthMethod::JwtCache));
    assert_eq!(backend.calls(), 0, "no store access on a cache hit");
}

#[tokio::test]
async fn test_header_used_when_no_token() {
    let auth = authenticator().await;
    let header = format!(
        "Basic {}",
        HeaderCredentials::encode("bob", "builder:can:we:fix:it")
    );

    let decision = auth
        .decide(&request("/public/docs").with_credential(header))
        .await;

    assert_eq!(decision.method, Some(AuthMethod::Header));
    assert_eq!(decision.username.as_deref(), Some("bob"));
    assert_eq!(decision.matched_route.as_deref(), Some("example.com/public*"));
    assert!(decision.payload.is_none());
}

#[tokio::test]
async fn test_bad_header_alone_is_an_error() {
    let auth = authenticator().await;

    let decision = auth
        .decide(&request("/admin/x").with_credential(HeaderCredentials::encode("alice", "nope")))
        .await;
    assert!(!decision.is_authed);
    assert!(!decision.is_authorized);
    assert_eq!(decision.method, Some(AuthMethod::Error));
    assert_eq!(decision.error.as_deref(), Some("Invalid username or password"));

    let decision = auth
        .decide(&request("/admin/x").with_credential("%%% not base64"))
        .await;
    assert_eq!(decision.method, Some(AuthMethod::Error));
    assert!(decision.error.unwrap().contains("base64"));
}

#[tokio::test]
async fn test_token_error_replaces_header_error() {
    let auth = authenticator().await;
    let mut claims = valid_claims("alice", &["example.com/admin/*"]);
    claims["exp"] = json!(common::current_timestamp() - 10);

    let decision = auth
        .decide(
            &request("/admin/x")
                .with_token(forge(&claims))
                .with_credential(HeaderCredentials::encode("alice", "nope")),
        )
        .await;

    assert!(!decision.is_authed);
    assert_eq!(decision.method, Some(AuthMethod::Error));
    assert_eq!(decision.error.as_deref(), Some(INVALID_TOKEN_MESSAGE));
}

#[tokio::test]
async fn test_nothing_presented_leaves_method_unset() {
    let auth = authenticator().await;
    let decision = auth.decide(&request("/admin/x")).await;

    assert!(!decision.is_authed);
    assert!(!decision.is_authorized);
    assert_eq!(decision.method, None);
    assert_eq!(decision.error, None);

    let json = serde_json::to_value(&decision).unwrap();
    assert_eq!(json["method"], json!(null));
    assert_eq!(json["isAuthed"], json!(false));
}

#[tokio::test]
async fn test_token_cache_eviction_under_traffic() {
    // GIVEN: a token cache of 3 entries evicting 1 at a time
    let auth = Authenticator::new(&config_with_token_cache(3, 1), seeded_backend().await).unwrap();

    // WHEN: four distinct tokens are verified in sequence
    let mut tokens = Vec::new();
    for _ in 0..4 {
        let token = auth
            .issue_token("alice", &admin_routes(), &ClaimExtensions::new())
            .unwrap()
            .token;
        let decision = auth.decide(&request("/admin/x").with_token(token.clone())).await;
        assert_eq!(decision.method, Some(AuthMethod::Jwt));
        tokens.push(token);
    }

    // THEN: at most three remain and the first is gone
    assert!(auth.token_cache().len() <= 3);
    assert!(!auth.token_cache().contains(&tokens[0]));
    assert!(auth.token_cache().contains(&tokens[3]));
    assert_eq!(auth.cache_stats().token.evictions, 1);

    // The evicted token still works, through full verification
    let decision = auth
        .decide(&request("/admin/x").with_token(tokens[0].clone()))
        .await;
    assert_eq!(decision.method, Some(AuthMethod::Jwt));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_decisions_share_caches() {
    // GIVEN: one engine with a 3-entry token cache shared by many tasks
    let auth = Arc::new(
        Authenticator::new(&config_with_token_cache(3, 1), seeded_backend().await).unwrap(),
    );

    // WHEN: eight tasks each verify three distinct tokens, then reuse the last
    let mut handles = Vec::new();
    for _ in 0..8 {
        let auth = Arc::clone(&auth);
        handles.push(tokio::spawn(async move {
            let mut last = String::new();
            for _ in 0..3 {
                last = auth
                    .issue_token("alice", &admin_routes(), &ClaimExtensions::new())
                    .unwrap()
                    .token;
                let decision = auth.decide(&request("/admin/x").with_token(last.clone())).await;
                assert_eq!(decision.method, Some(AuthMethod::Jwt));
                assert!(decision.is_allowed());
                assert!(auth.token_cache().len() <= 3);
            }
            let decision = auth.decide(&request("/admin/x").with_token(last)).await;
            assert!(decision.is_allowed());
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // THEN: the size bound held and every insert past it was evicted
    let stats = auth.cache_stats();
    assert!(auth.token_cache().len() <= 3);
    assert!(stats.token.evictions >= 24 - 3);
    assert_eq!(stats.authz.hits + stats.authz.misses, 32);
    assert!(stats.authz.misses >= 1);
    assert_eq!(auth.authz_cache().len(), 1);
}

#[tokio::test]
async fn test_dot_segments_cannot_escape_granted_routes() {
    // GIVEN: alice may only reach the admin area
    let auth = authenticator().await;
    let token = auth
        .issue_token("alice", &admin_routes(), &ClaimExtensions::new())
        .unwrap()
        .token;

    for path in ["/admin/../billing", "/admin/%2e%2e/billing", "/admin/%2E%2E/billing?x=1"] {
        // WHEN: she climbs out of it with a dot segment
        let decision = auth.decide(&request(path).with_token(token.clone())).await;

        // THEN: the resolved path is checked and refused
        assert!(decision.is_authed, "{path}");
        assert!(!decision.is_authorized, "{path}");
        assert_eq!(decision.matched_route, None);
    }

    // Dot segments that stay inside the grant still work
    let decision = auth
        .decide(&request("/admin/reports/../x").with_token(token))
        .await;
    assert!(decision.is_authorized);
}

#[tokio::test]
async fn test_unknown_users_are_negatively_cached() {
    let backend = Arc::new(CountingBackend::default());
    let auth = Authenticator::new(&config(), Arc::clone(&backend) as _).unwrap();
    let header = HeaderCredentials::encode("mallory", "guess");

    for _ in 0..5 {
        let decision = auth
            .decide(&request("/admin/x").with_credential(header.clone()))
            .await;
        assert_eq!(decision.method, Some(AuthMethod::Error));
    }
    assert_eq!(backend.calls(), 1);

    // Provisioned later; visible once the cached miss is invalidated
    backend
        .inner
        .put_user("mallory", "guess", &["example.com/*"])
        .await
        .unwrap();
    auth.invalidate_user("mallory").await;

    let decision = auth
        .decide(&request("/admin/x").with_credential(header))
        .await;
    assert_eq!(decision.method, Some(AuthMethod::Header));
    assert!(decision.is_authorized);
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_backend_failure_reads_as_bad_credentials() {
    let auth = Authenticator::new(&config(), Arc::new(FailingBackend)).unwrap();
    let decision = auth
        .decide(&request("/admin/x").with_credential(HeaderCredentials::encode("alice", "pw")))
        .await;

    assert!(!decision.is_authed);
    assert_eq!(decision.method, Some(AuthMethod::Error));
    assert_eq!(decision.error.as_deref(), Some("Invalid username or password"));
}

#[tokio::test]
async fn test_internal_fault_becomes_generic_error() {
    let auth = Authenticator::new(&config(), Arc::new(PanickingBackend)).unwrap();
    let decision = auth
        .decide(&request("/admin/x").with_credential(HeaderCredentials::encode("alice", "pw")))
        .await;

    assert!(!decision.is_authed);
    assert!(!decision.is_authorized);
    assert_eq!(decision.method, Some(AuthMethod::Error));
    assert_eq!(decision.error.as_deref(), Some(INTERNAL_ERROR_MESSAGE));
    assert!(!decision.error.unwrap().contains("exploded"));
}

#[tokio::test]
async fn test_authorization_is_cached_per_user_and_target() {
    let auth = authenticator().await;
    let header = HeaderCredentials::encode("alice", "wonderland");

    for _ in 0..3 {
        let decision = auth
            .decide(&request("/admin/x").with_credential(header.clone()))
            .await;
        assert!(decision.is_authorized);
    }
    auth.decide(&request("/admin/y").with_credential(header)).await;

    let stats = auth.cache_stats();
    assert_eq!(stats.authz.len, 2);
    assert_eq!(stats.authz.hits, 2);
    assert_eq!(stats.authz.misses, 2);
}

#[tokio::test]
async fn test_authorization_cache_is_shared_across_methods() {
    // GIVEN: a token granting alice a route her stored record lacks
    let auth = authenticator().await;
    let token = auth
        .issue_token("alice", &["example.com/billing".to_string()], &ClaimExtensions::new())
        .unwrap()
        .token;
    let header = HeaderCredentials::encode("alice", "wonderland");
    assert!(auth.decide(&request("/billing").with_token(token)).await.is_authorized);

    // WHEN: she logs in by header for the same target
    let decision = auth.decide(&request("/billing").with_credential(header.clone())).await;

    // THEN: the decision cached under (alice, target) is reused
    assert_eq!(decision.method, Some(AuthMethod::Header));
    assert!(decision.is_authorized);

    // Dropping her entries makes the stored routes apply again
    auth.invalidate_user("alice").await;
    let decision = auth.decide(&request("/billing").with_credential(header)).await;
    assert!(decision.is_authed);
    assert!(!decision.is_authorized);
}

#[tokio::test]
async fn test_login_issues_usable_session() {
    let auth = authenticator().await;
    let session = auth
        .login("alice", &secrecy::SecretString::new("wonderland".to_string()))
        .await
        .unwrap();

    let decision = auth
        .decide(&request("/admin/settings").with_token(session.token))
        .await;
    assert!(decision.is_allowed());
    assert_eq!(decision.method, Some(AuthMethod::Jwt));
}

#[tokio::test]
async fn test_secret_validation_blocks_construction() {
    let config = gatehouse_auth::EngineConfig::builder()
        .secret("changeme")
        .build();
    assert!(Authenticator::new(&config, Arc::new(MemoryBackend::new())).is_err());
}
