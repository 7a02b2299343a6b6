//! Common test utilities for integration tests
//!
//! Builds authenticators over in-memory backends and forges tokens directly
//! with `jsonwebtoken` for cases the engine itself would never issue.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use gatehouse_auth::{
    AuthRequest, Authenticator, CacheLimits, EngineConfig, MemoryBackend, RequestTarget,
    StoreError, UserBackend,
};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};

pub const SECRET: &str = "test_secret_key_at_least_32_bytes_long_12345678";
pub const ISSUER: &str = "https://auth.example.com";
pub const AUDIENCE: &str = "example.com";

/// Current UTC time in seconds
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Engine configuration shared by the integration tests
pub fn config() -> EngineConfig {
    EngineConfig::builder()
        .secret(SECRET)
        .issuer(ISSUER)
        .audience(AUDIENCE)
        .session_ttl_secs(3600)
        .build()
}

/// Configuration with a tiny token cache
pub fn config_with_token_cache(max_size: usize, batch: usize) -> EngineConfig {
    EngineConfig::builder()
        .secret(SECRET)
        .issuer(ISSUER)
        .audience(AUDIENCE)
        .session_ttl_secs(3600)
        .token_cache_limits(CacheLimits::new(max_size, batch))
        .build()
}

/// Backend seeded with `alice` (admin routes) and `bob` (public routes)
pub async fn seeded_backend() -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::new());
    backend
        .put_user("alice", "wonderland", &["example.com/admin/*"])
        .await
        .expect("seed alice");
    backend
        .put_user("bob", "builder:can:we:fix:it", &["example.com/public*"])
        .await
        .expect("seed bob");
    backend
}

/// Authenticator over [`seeded_backend`]
pub async fn authenticator() -> Authenticator {
    Authenticator::new(&config(), seeded_backend().await).expect("valid config")
}

/// Request for `example.com{path}`
pub fn request(path: &str) -> AuthRequest {
    AuthRequest::new(RequestTarget::new("example.com", path))
}

/// Claims the engine would issue for `sub`, valid for an hour
pub fn valid_claims(sub: &str, routes: &[&str]) -> Value {
    let now = current_timestamp();
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": sub,
        "routes": routes,
        "jti": uuid::Uuid::new_v4().to_string(),
        "iat": now,
        "nbf": now,
        "exp": now + 3600,
    })
}

/// Sign arbitrary claims with the test secret
pub fn forge(claims: &Value) -> String {
    forge_with(claims, SECRET, Algorithm::HS256)
}

/// Sign arbitrary claims with any secret and HMAC algorithm
pub fn forge_with(claims: &Value, secret: &str, algorithm: Algorithm) -> String {
    encode(
        &Header::new(algorithm),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to encode JWT")
}

/// Backend that counts lookups
#[derive(Debug, Default)]
pub struct CountingBackend {
    pub inner: MemoryBackend,
    pub calls: AtomicUsize,
}

impl CountingBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserBackend for CountingBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }
}

/// Backend that panics on every lookup
#[derive(Debug, Default)]
pub struct PanickingBackend;

#[async_trait]
impl UserBackend for PanickingBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        panic!("backend exploded while reading {key}");
    }
}

/// Backend that always fails
#[derive(Debug, Default)]
pub struct FailingBackend;

#[async_trait]
impl UserBackend for FailingBackend {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Backend("connection refused".to_string()))
    }
}
