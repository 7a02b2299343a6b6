//! Engine configuration
//!
//! [`EngineConfig`] is the whole configuration surface of the decision engine:
//! signing secret, claim issuer/audience, session lifetime, cache sizing and the
//! names of the cookie and header that carry credentials.
//!
//! It can be loaded from a file (TOML, YAML or JSON) with `GATEHOUSE_`
//! environment overrides, or built programmatically:
//!
//! ```rust
//! use gatehouse_auth::EngineConfig;
//!
//! let config = EngineConfig::builder()
//!     .secret("a-very-long-signing-secret-for-tests-0123456789")
//!     .issuer("https://auth.example.com")
//!     .audience("example.com")
//!     .session_ttl_secs(3600)
//!     .build();
//!
//! assert!(config.validate().is_ok());
//! ```

use std::path::Path;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// Minimum signing secret length in bytes (HS256 key strength)
pub const MIN_SECRET_LENGTH: usize = 32;

/// Secrets that ship in sample configs and must never reach production
pub const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "changeme",
    "secret",
    "your-secret-here",
    "replace-with-a-long-random-secret",
    "CHANGE_ME_TO_A_SECURE_RANDOM_STRING_AT_LEAST_32_CHARS",
];

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "GATEHOUSE";

/// Decision engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// HMAC signing secret for session tokens
    #[serde(deserialize_with = "deserialize_optional_secret")]
    pub secret: Option<SecretString>,
    /// `iss` claim issued and expected
    pub issuer: String,
    /// `aud` claim issued and expected
    pub audience: String,
    /// Session token lifetime in seconds
    pub session_ttl_secs: u64,
    /// Verified-token cache
    pub token_cache: TokenCacheConfig,
    /// Resolved-authorization cache
    pub authz_cache: CacheLimits,
    /// Credential store cache
    pub user_cache: UserCacheConfig,
    /// Cookie carrying the session token
    pub cookie_name: String,
    /// Header carrying `base64(username:secret)`
    pub credential_header: String,
}

/// Size limits for a high-water-mark cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheLimits {
    /// Size at which a batch is evicted before the next insert
    pub max_size: usize,
    /// Number of oldest entries removed per eviction
    pub eviction_batch_size: usize,
}

/// Verified-token cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TokenCacheConfig {
    /// Entry lifetime in seconds
    pub ttl_secs: u64,
    /// Size at which a batch is evicted before the next insert
    pub max_size: usize,
    /// Number of oldest entries removed per eviction
    pub eviction_batch_size: usize,
}

/// Credential store cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UserCacheConfig {
    /// Lifetime of positive and negative entries, in seconds
    pub ttl_secs: u64,
    /// Upper bound on cached usernames
    pub max_entries: u64,
}

fn deserialize_optional_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.map(SecretString::new))
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            secret: None,
            issuer: "gatehouse".to_string(),
            audience: "gatehouse-clients".to_string(),
            session_ttl_secs: 24 * 60 * 60,
            token_cache: TokenCacheConfig::default(),
            authz_cache: CacheLimits::default(),
            user_cache: UserCacheConfig::default(),
            cookie_name: "gatehouse_session".to_string(),
            credential_header: "x-gatehouse-credentials".to_string(),
        }
    }
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            eviction_batch_size: 1_000,
        }
    }
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        let limits = CacheLimits::default();
        Self {
            ttl_secs: 300,
            max_size: limits.max_size,
            eviction_batch_size: limits.eviction_batch_size,
        }
    }
}

impl Default for UserCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            max_entries: 10_000,
        }
    }
}

impl CacheLimits {
    /// Create limits
    #[must_use]
    pub const fn new(max_size: usize, eviction_batch_size: usize) -> Self {
        Self {
            max_size,
            eviction_batch_size,
        }
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::invalid(field, "max_size must be at least 1"));
        }
        if self.eviction_batch_size == 0 {
            return Err(ConfigError::invalid(
                field,
                "eviction_batch_size must be at least 1",
            ));
        }
        if self.eviction_batch_size > self.max_size {
            return Err(ConfigError::invalid(
                field,
                format!(
                    "eviction_batch_size ({}) exceeds max_size ({})",
                    self.eviction_batch_size, self.max_size
                ),
            ));
        }
        Ok(())
    }
}

impl TokenCacheConfig {
    /// Entry lifetime
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Sizing as [`CacheLimits`]
    #[must_use]
    pub fn limits(&self) -> CacheLimits {
        CacheLimits::new(self.max_size, self.eviction_batch_size)
    }
}

impl UserCacheConfig {
    /// Entry lifetime
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Check a signing secret against the length floor and the placeholder list
///
/// # Errors
///
/// Returns [`ConfigError::MissingSecret`], [`ConfigError::WeakSecret`] or
/// [`ConfigError::PlaceholderSecret`].
pub fn validate_secret(secret: Option<&SecretString>) -> Result<(), ConfigError> {
    let secret = secret.ok_or(ConfigError::MissingSecret)?.expose_secret();

    if secret.trim().is_empty() {
        return Err(ConfigError::MissingSecret);
    }
    if PLACEHOLDER_SECRETS
        .iter()
        .any(|placeholder| secret.eq_ignore_ascii_case(placeholder))
    {
        return Err(ConfigError::PlaceholderSecret);
    }
    if secret.len() < MIN_SECRET_LENGTH {
        return Err(ConfigError::WeakSecret {
            minimum: MIN_SECRET_LENGTH,
            actual: secret.len(),
        });
    }
    Ok(())
}

impl EngineConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// Environment variables with the `GATEHOUSE_` prefix override file
    /// settings, with `__` separating nested keys
    /// (`GATEHOUSE_TOKEN_CACHE__TTL_SECS=60`).
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, has an unsupported extension,
    /// or does not deserialize. The result is not validated; call
    /// [`EngineConfig::validate`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`EngineConfig::from_file`].
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from the environment only
    ///
    /// # Errors
    ///
    /// Returns an error if an override does not deserialize.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Create a configuration builder
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Session token lifetime
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns the first problem found. A weak or missing secret is reported
    /// before anything else.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_secret(self.secret.as_ref())?;

        if self.issuer.trim().is_empty() {
            return Err(ConfigError::invalid("issuer", "must not be empty"));
        }
        if self.audience.trim().is_empty() {
            return Err(ConfigError::invalid("audience", "must not be empty"));
        }
        if self.session_ttl_secs == 0 {
            return Err(ConfigError::invalid(
                "session_ttl_secs",
                "must be at least 1 second",
            ));
        }
        if self.token_cache.ttl_secs == 0 {
            return Err(ConfigError::invalid(
                "token_cache.ttl_secs",
                "must be at least 1 second",
            ));
        }
        self.token_cache.limits().validate("token_cache")?;
        self.authz_cache.validate("authz_cache")?;
        if self.user_cache.ttl_secs == 0 {
            return Err(ConfigError::invalid(
                "user_cache.ttl_secs",
                "must be at least 1 second",
            ));
        }
        if self.cookie_name.is_empty()
            || self
                .cookie_name
                .chars()
                .any(|c| c.is_whitespace() || matches!(c, ';' | '=' | ','))
        {
            return Err(ConfigError::invalid(
                "cookie_name",
                "must be a non-empty cookie token",
            ));
        }
        if http::HeaderName::from_bytes(self.credential_header.as_bytes()).is_err() {
            return Err(ConfigError::invalid(
                "credential_header",
                "must be a valid HTTP header name",
            ));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`]
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a builder starting from defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signing secret
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.config.secret = Some(SecretString::new(secret.into()));
        self
    }

    /// Set the issuer
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.issuer = issuer.into();
        self
    }

    /// Set the audience
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.config.audience = audience.into();
        self
    }

    /// Set the session lifetime
    #[must_use]
    pub fn session_ttl_secs(mut self, secs: u64) -> Self {
        self.config.session_ttl_secs = secs;
        self
    }

    /// Set the verified-token cache TTL
    #[must_use]
    pub fn token_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.token_cache.ttl_secs = secs;
        self
    }

    /// Set the verified-token cache limits
    #[must_use]
    pub fn token_cache_limits(mut self, limits: CacheLimits) -> Self {
        self.config.token_cache.max_size = limits.max_size;
        self.config.token_cache.eviction_batch_size = limits.eviction_batch_size;
        self
    }

    /// Set the authorization cache limits
    #[must_use]
    pub fn authz_cache_limits(mut self, limits: CacheLimits) -> Self {
        self.config.authz_cache = limits;
        self
    }

    /// Set the credential store cache TTL
    #[must_use]
    pub fn user_cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.user_cache.ttl_secs = secs;
        self
    }

    /// Set the session cookie name
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.config.cookie_name = name.into();
        self
    }

    /// Set the credential header name
    pub fn credential_header(mut self, name: impl Into<String>) -> Self {
        self.config.credential_header = name.into();
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> EngineConfig {
        self.config
    }
}
