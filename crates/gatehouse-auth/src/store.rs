//! Credential store
//!
//! User records live in an external key-value backend under `user:<username>`
//! as JSON:
//!
//! ```json
//! { "username": "alice", "password": "…", "routes": ["example.com/admin/*"] }
//! ```
//!
//! [`CredentialStore`] fronts the backend with a TTL cache. Misses are cached
//! too, so repeated lookups for an unknown user do not reach the backend.
//! Backend and parse failures are logged and reported as "not found", but are
//! never cached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::UserCacheConfig;
use crate::credentials::secrets_match;
use crate::error::{CredentialError, StoreError};

/// Backend key prefix for user records
pub const USER_KEY_PREFIX: &str = "user:";

/// Backend key for a username
#[must_use]
pub fn user_key(username: &str) -> String {
    format!("{USER_KEY_PREFIX}{username}")
}

/// A user record
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    /// Unique username
    pub username: String,
    /// Opaque secret, compared as bytes
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
    /// Authorized route patterns, in match order
    #[serde(default)]
    pub routes: Vec<String>,
}

impl User {
    /// Create a user record
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        routes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
            routes: routes.into_iter().map(Into::into).collect(),
        }
    }

    /// Compare a presented secret against the stored one in constant time
    #[must_use]
    pub fn password_matches(&self, presented: &SecretString) -> bool {
        secrets_match(presented, &self.password)
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::new)
}

/// Key-value backend holding serialized user records
#[async_trait]
pub trait UserBackend: Send + Sync + std::fmt::Debug {
    /// Fetch the raw value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

#[async_trait]
impl<T: UserBackend + ?Sized> UserBackend for Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }
}

/// In-process backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    /// Create an empty backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value
    pub async fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().await.insert(key.into(), value.into());
    }

    /// Store a user record under its `user:` key
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Parse`] if the record does not serialize.
    pub async fn put_user(
        &self,
        username: &str,
        password: &str,
        routes: &[&str],
    ) -> Result<(), StoreError> {
        let record = serde_json::json!({
            "username": username,
            "password": password,
            "routes": routes,
        });
        self.put(user_key(username), serde_json::to_string(&record)?)
            .await;
        Ok(())
    }

    /// Remove a value
    pub async fn remove(&self, key: &str) -> Option<String> {
        self.values.write().await.remove(key)
    }
}

#[async_trait]
impl UserBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().await.get(key).cloned())
    }
}

/// Cached view over a [`UserBackend`]
#[derive(Debug)]
pub struct CredentialStore {
    backend: Arc<dyn UserBackend>,
    cache: Cache<String, Option<Arc<User>>>,
}

impl CredentialStore {
    /// Create a store with the given cache settings
    pub fn new(backend: Arc<dyn UserBackend>, config: &UserCacheConfig) -> Self {
        Self::with_cache(backend, config.ttl(), config.max_entries)
    }

    /// Create a store with an explicit TTL and capacity
    pub fn with_cache(backend: Arc<dyn UserBackend>, ttl: Duration, max_entries: u64) -> Self {
        Self {
            backend,
            cache: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(max_entries)
                .build(),
        }
    }

    /// Look up a user, cache first
    ///
    /// `None` means unknown user, or a backend fault that has already been
    /// logged. Only the former is cached.
    pub async fn get_user(&self, username: &str) -> Option<Arc<User>> {
        if let Some(cached) = self.cache.get(username).await {
            debug!(username, found = cached.is_some(), "Credential cache hit");
            return cached;
        }

        match self.fetch(username).await {
            Ok(user) => {
                self.cache.insert(username.to_string(), user.clone()).await;
                user
            }
            Err(e) => {
                warn!(username, error = %e, "Credential lookup failed");
                None
            }
        }
    }

    async fn fetch(&self, username: &str) -> Result<Option<Arc<User>>, StoreError> {
        let Some(raw) = self.backend.get(&user_key(username)).await? else {
            return Ok(None);
        };

        let user: User = serde_json::from_str(&raw)?;
        if user.username != username {
            return Err(StoreError::Backend(format!(
                "record under `{}` names a different user",
                user_key(username)
            )));
        }
        Ok(Some(Arc::new(user)))
    }

    /// Look up a user and check a presented secret
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::InvalidCredentials`] for an unknown user or
    /// a wrong secret, without distinguishing the two.
    pub async fn verify_password(
        &self,
        username: &str,
        presented: &SecretString,
    ) -> Result<Arc<User>, CredentialError> {
        match self.get_user(username).await {
            Some(user) if user.password_matches(presented) => Ok(user),
            _ => Err(CredentialError::InvalidCredentials),
        }
    }

    /// Drop a cached entry so the next lookup goes to the backend
    pub async fn invalidate(&self, username: &str) {
        self.cache.invalidate(username).await;
    }

    /// Number of cached usernames, positive and negative
    pub fn cached_len(&self) -> u64 {
        self.cache.entry_count()
    }
}
