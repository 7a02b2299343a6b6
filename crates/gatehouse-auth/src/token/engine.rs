//! HS256 token signing and verification
//!
//! The HMAC keys are derived from the secret once, in [`TokenEngine::new`],
//! and reused for every call. Signature checks go through the MAC-verify
//! primitive of `jsonwebtoken`, which compares in constant time.
//!
//! Verification rejects, without ever erroring to the caller:
//! - anything that is not exactly three segments
//! - a signature that does not verify under the configured secret
//! - `exp` in the past or `nbf` in the future (no leeway)
//! - `iss` or `aud` that differ from the configured values
//! - a payload without `sub` or without an array of strings in `routes`

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::{ClaimExtensions, SessionClaims};
use crate::config::{EngineConfig, validate_secret};
use crate::error::{ConfigError, TokenError, TokenRejection};

/// Claims that must be present before the payload is even looked at
const REQUIRED_SPEC_CLAIMS: &[&str] = &["exp", "nbf", "iss", "aud", "sub"];

/// A freshly signed token and the claims inside it
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Compact serialized token
    pub token: String,
    /// Claims as signed
    pub claims: SessionClaims,
}

/// Creates and verifies session tokens
pub struct TokenEngine {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    session_ttl: Duration,
}

// Keys stay out of Debug output
impl std::fmt::Debug for TokenEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEngine")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("session_ttl", &self.session_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenEngine {
    /// Create an engine, deriving the signing keys once
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the secret is absent, shorter than
    /// [`MIN_SECRET_LENGTH`](crate::config::MIN_SECRET_LENGTH), or a known
    /// placeholder.
    pub fn new(
        secret: Option<&SecretString>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        session_ttl: Duration,
    ) -> Result<Self, ConfigError> {
        validate_secret(secret)?;
        let secret = secret.ok_or(ConfigError::MissingSecret)?.expose_secret();
        let issuer = issuer.into();
        let audience = audience.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[&issuer]);
        validation.set_audience(&[&audience]);
        validation.set_required_spec_claims(REQUIRED_SPEC_CLAIMS);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer,
            audience,
            session_ttl,
        })
    }

    /// Create an engine from an [`EngineConfig`]
    ///
    /// # Errors
    ///
    /// See [`TokenEngine::new`].
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.secret.as_ref(),
            config.issuer.clone(),
            config.audience.clone(),
            config.session_ttl(),
        )
    }

    /// Configured issuer
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Configured audience
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Configured session lifetime
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Sign a session token for `username`
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::EmptySubject`] for an empty username, or
    /// [`TokenError::Signing`] if encoding fails.
    pub fn create(
        &self,
        username: &str,
        routes: &[String],
        extensions: &ClaimExtensions,
    ) -> Result<String, TokenError> {
        self.issue(username, routes, extensions)
            .map(|issued| issued.token)
    }

    /// Sign a session token and return it with its claims
    ///
    /// # Errors
    ///
    /// See [`TokenEngine::create`].
    pub fn issue(
        &self,
        username: &str,
        routes: &[String],
        extensions: &ClaimExtensions,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_at(username, routes, extensions, Utc::now().timestamp())
    }

    pub(crate) fn issue_at(
        &self,
        username: &str,
        routes: &[String],
        extensions: &ClaimExtensions,
        now: i64,
    ) -> Result<IssuedToken, TokenError> {
        if username.is_empty() {
            return Err(TokenError::EmptySubject);
        }

        let ttl = i64::try_from(self.session_ttl.as_secs()).unwrap_or(i64::MAX);
        let claims = SessionClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: username.to_string(),
            routes: routes.to_vec(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            nbf: now,
            exp: now.saturating_add(ttl),
            extensions: extensions.merged(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        debug!(
            subject = %claims.sub,
            jti = %claims.jti,
            exp = claims.exp,
            "Session token issued"
        );

        Ok(IssuedToken { token, claims })
    }

    /// Verify a token, returning its claims or `None`
    pub fn verify(&self, token: &str) -> Option<SessionClaims> {
        match self.inspect(token) {
            Ok(claims) => Some(claims),
            Err(rejection) => {
                debug!(reason = %rejection, "Session token rejected");
                None
            }
        }
    }

    /// Verify a token, reporting why it was rejected
    ///
    /// # Errors
    ///
    /// Returns the [`TokenRejection`] describing the first failed check.
    pub fn inspect(&self, token: &str) -> Result<SessionClaims, TokenRejection> {
        if token.split('.').count() != 3 {
            return Err(TokenRejection::Malformed);
        }

        let data = decode::<Map<String, Value>>(token, &self.decoding_key, &self.validation)
            .map_err(|e| rejection_from(e.kind()))?;

        SessionClaims::from_payload(data.claims)
    }
}

fn rejection_from(kind: &ErrorKind) -> TokenRejection {
    match kind {
        ErrorKind::InvalidSignature => TokenRejection::BadSignature,
        ErrorKind::ExpiredSignature => TokenRejection::Expired,
        ErrorKind::ImmatureSignature => TokenRejection::NotYetValid,
        ErrorKind::InvalidIssuer => TokenRejection::InvalidIssuer,
        ErrorKind::InvalidAudience => TokenRejection::InvalidAudience,
        ErrorKind::MissingRequiredClaim(claim) => TokenRejection::MissingClaim(claim.clone()),
        ErrorKind::InvalidToken
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => TokenRejection::Malformed,
        other => TokenRejection::InvalidClaims(format!("{other:?}")),
    }
}
