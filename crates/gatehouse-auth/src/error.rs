//! Error types for the decision engine
//!
//! Each concern gets its own enum. Only [`ConfigError`] is fatal: it prevents
//! an [`Authenticator`](crate::Authenticator) from being constructed. Every
//! other error is absorbed by the orchestrator and surfaces, at most, as a
//! message in a [`Decision`](crate::Decision).

use std::path::PathBuf;

use thiserror::Error;

/// Configuration errors. Fatal at initialization time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No signing secret was configured
    #[error("Signing secret is not configured")]
    MissingSecret,

    /// The signing secret is shorter than the minimum length
    #[error("Signing secret is too short: {actual} bytes (minimum {minimum})")]
    WeakSecret {
        /// Minimum accepted length in bytes
        minimum: usize,
        /// Length of the configured secret
        actual: usize,
    },

    /// The signing secret is a well-known placeholder value
    #[error("Signing secret is a placeholder value and must be replaced")]
    PlaceholderSecret,

    /// A configuration field has an unusable value
    #[error("Invalid configuration value for `{field}`: {reason}")]
    InvalidValue {
        /// Field name
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Token issuance failures
#[derive(Debug, Error)]
pub enum TokenError {
    /// Username was empty
    #[error("Cannot issue a token without a subject")]
    EmptySubject,

    /// Signing failed
    #[error("Failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// Why a presented token was not accepted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenRejection {
    /// Not three dot-separated segments, or undecodable segments
    #[error("Malformed token")]
    Malformed,

    /// MAC verification failed
    #[error("Signature mismatch")]
    BadSignature,

    /// `exp` is in the past
    #[error("Token expired")]
    Expired,

    /// `nbf` is in the future
    #[error("Token not yet valid")]
    NotYetValid,

    /// `iss` does not match the configured issuer
    #[error("Issuer mismatch")]
    InvalidIssuer,

    /// `aud` does not match the configured audience
    #[error("Audience mismatch")]
    InvalidAudience,

    /// A registered claim required by the engine is absent
    #[error("Missing required claim `{0}`")]
    MissingClaim(String),

    /// `routes` is absent or is not an array of strings
    #[error("Missing or malformed `routes` claim")]
    InvalidRoutes,

    /// Any other claim failed schema validation
    #[error("Invalid claims: {0}")]
    InvalidClaims(String),
}

/// Credential header and password failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// Header is not valid base64
    #[error("Credential header is not valid base64")]
    InvalidEncoding,

    /// Decoded header is not UTF-8
    #[error("Credential header is not valid UTF-8")]
    InvalidUtf8,

    /// No `:` separating username and secret
    #[error("Credential header is missing the `:` delimiter")]
    MissingDelimiter,

    /// Username part is empty
    #[error("Credential header has an empty username")]
    EmptyUsername,

    /// Username unknown or secret mismatch. Deliberately indistinguishable.
    #[error("Invalid username or password")]
    InvalidCredentials,
}

impl CredentialError {
    /// Whether the header itself was malformed, as opposed to wrong credentials
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::InvalidCredentials)
    }
}

/// Credential backend failures. Never cached.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not be reached or returned an error
    #[error("Credential backend error: {0}")]
    Backend(String),

    /// Stored record could not be parsed
    #[error("Failed to parse stored user record: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Route pattern failures
#[derive(Debug, Error)]
pub enum RouteError {
    /// Pattern could not be compiled
    #[error("Route pattern `{pattern}` failed to compile: {source}")]
    Compile {
        /// The offending pattern
        pattern: String,
        /// Underlying regex error
        #[source]
        source: regex::Error,
    },
}

/// Login failures
#[derive(Debug, Error)]
pub enum LoginError {
    /// Unknown user or wrong password
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// Token could not be issued
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Internal faults inside a decision. Converted to a generic message before
/// reaching a [`Decision`](crate::Decision).
#[derive(Debug, Error)]
pub enum AuthError {
    /// Route matching failed
    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Result alias for engine internals
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_error_classification() {
        assert!(CredentialError::MissingDelimiter.is_malformed());
        assert!(CredentialError::InvalidEncoding.is_malformed());
        assert!(!CredentialError::InvalidCredentials.is_malformed());
    }

    #[test]
    fn test_weak_secret_message() {
        let err = ConfigError::WeakSecret {
            minimum: 32,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "Signing secret is too short: 4 bytes (minimum 32)"
        );
    }
}
