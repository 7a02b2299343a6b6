//! Request-side inputs to a decision
//!
//! The session token is read from the configured cookie, falling back to an
//! `Authorization: Bearer` header. The programmatic credential is read from
//! the configured header.

use http::header::{AUTHORIZATION, COOKIE, HOST};
use http::{HeaderMap, HeaderName, Uri};

use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::routes::RequestTarget;

/// Where credentials are found on a request
#[derive(Debug, Clone)]
pub struct CredentialSources {
    cookie_name: String,
    credential_header: HeaderName,
}

impl CredentialSources {
    /// Create from a cookie name and a header name
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if `credential_header` is not a
    /// valid header name.
    pub fn new(cookie_name: impl Into<String>, credential_header: &str) -> Result<Self, ConfigError> {
        let credential_header = HeaderName::from_bytes(credential_header.as_bytes())
            .map_err(|e| ConfigError::invalid("credential_header", e.to_string()))?;
        Ok(Self {
            cookie_name: cookie_name.into(),
            credential_header,
        })
    }

    /// Take the names from an engine configuration
    ///
    /// # Errors
    ///
    /// Same as [`CredentialSources::new`].
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Self::new(config.cookie_name.clone(), &config.credential_header)
    }

    /// Session cookie name
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Credential header name
    pub fn credential_header(&self) -> &HeaderName {
        &self.credential_header
    }
}

/// Everything a decision needs from one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    /// Raw session token, if presented
    pub token: Option<String>,
    /// Raw credential header value, if presented
    pub credential: Option<String>,
    /// Host and path being requested
    pub target: RequestTarget,
}

impl AuthRequest {
    /// Request with only a target
    #[must_use]
    pub fn new(target: RequestTarget) -> Self {
        Self {
            token: None,
            credential: None,
            target,
        }
    }

    /// Attach a session token
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attach a credential header value
    #[must_use]
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    /// Extract from request parts
    pub fn from_parts(parts: &http::request::Parts, sources: &CredentialSources) -> Self {
        Self::from_headers(&parts.uri, &parts.headers, sources)
    }

    /// Extract from a URI and headers
    ///
    /// An origin-form URI takes its host from the `Host` header. With neither,
    /// the target has an empty host and only wildcard-led patterns can match.
    pub fn from_headers(uri: &Uri, headers: &HeaderMap, sources: &CredentialSources) -> Self {
        let host_header = headers.get(HOST).and_then(|v| v.to_str().ok());
        let target = RequestTarget::from_uri(uri, host_header)
            .unwrap_or_else(|| RequestTarget::new("", uri.path()));

        let token = cookie_value(headers, &sources.cookie_name).or_else(|| bearer_token(headers));
        let credential = headers
            .get(&sources.credential_header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        Self {
            token,
            credential,
            target,
        }
    }
}

/// Find a cookie by name across all `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}
