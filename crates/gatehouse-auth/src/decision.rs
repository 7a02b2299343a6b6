//! The per-request decision
//!
//! A [`Decision`] is the only artifact the engine hands back to its host. It
//! serializes with camelCase field names:
//!
//! ```json
//! {
//!   "isAuthed": true,
//!   "isAuthorized": true,
//!   "method": "jwt-cache",
//!   "username": "alice",
//!   "payload": { "sub": "alice", "routes": ["example.com/admin/*"], "...": "..." },
//!   "matchedRoute": "example.com/admin/*",
//!   "error": null,
//!   "timestamp": "2026-10-18T09:30:00Z"
//! }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::token::SessionClaims;

/// Error message when a presented token fails verification
pub const INVALID_TOKEN_MESSAGE: &str = "invalid or expired token";

/// Error message for any internal fault
pub const INTERNAL_ERROR_MESSAGE: &str = "internal authentication error";

/// How the identity was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AuthMethod {
    /// Full token verification
    #[serde(rename = "jwt")]
    Jwt,
    /// Verified-token cache hit
    #[serde(rename = "jwt-cache")]
    JwtCache,
    /// Credential header
    #[serde(rename = "header")]
    Header,
    /// A credential was presented and rejected
    #[serde(rename = "error")]
    Error,
}

impl AuthMethod {
    /// Wire name of the method
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Jwt => "jwt",
            Self::JwtCache => "jwt-cache",
            Self::Header => "header",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of authenticating and authorizing one request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether an identity was established
    pub is_authed: bool,
    /// Whether that identity may reach the requested target
    pub is_authorized: bool,
    /// How the identity was established. `None` when nothing was presented.
    pub method: Option<AuthMethod>,
    /// Authenticated username
    pub username: Option<String>,
    /// Token claims, when authenticated by token
    pub payload: Option<Arc<SessionClaims>>,
    /// Route pattern that granted access
    pub matched_route: Option<String>,
    /// User-facing failure reason
    pub error: Option<String>,
    /// When the decision was made
    pub timestamp: DateTime<Utc>,
}

impl Decision {
    /// Nothing presented, nothing decided
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            is_authed: false,
            is_authorized: false,
            method: None,
            username: None,
            payload: None,
            matched_route: None,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Generic internal failure. Carries no diagnostic detail.
    #[must_use]
    pub fn internal_error() -> Self {
        Self {
            method: Some(AuthMethod::Error),
            error: Some(INTERNAL_ERROR_MESSAGE.to_string()),
            ..Self::anonymous()
        }
    }

    /// Whether the request may proceed
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.is_authed && self.is_authorized
    }

    /// Whether a credential was presented and rejected
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        !self.is_authed && self.method == Some(AuthMethod::Error)
    }
}
