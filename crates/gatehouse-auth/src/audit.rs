//! Structured audit logging for decisions
//!
//! Every event is emitted through `tracing` under the `audit::auth` target, so
//! a host can route the audit trail separately from operational logs:
//!
//! ```text
//! RUST_LOG=info,audit::auth=info
//! ```
//!
//! Usernames can be hashed (BLAKE3, truncated) for deployments that must not
//! keep identifiers in logs. Raw tokens and secrets are never logged; tokens
//! are referred to by their `jti`.
//!
//! ```rust
//! use gatehouse_auth::audit::{AuditLogger, AuthEvent};
//!
//! let logger = AuditLogger::new("gatehouse").with_identifier_hashing(true);
//! logger.log(AuthEvent::AccessDenied {
//!     username: "alice".to_string(),
//!     target: "example.com/public".to_string(),
//! });
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::decision::AuthMethod;

/// Audit logger for decision events
#[derive(Debug, Clone)]
pub struct AuditLogger {
    service_name: String,
    hash_identifiers: bool,
}

impl AuditLogger {
    /// Create a logger attributing events to `service_name`
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            hash_identifiers: false,
        }
    }

    /// Create a logger that hashes usernames
    pub fn privacy_focused(service_name: impl Into<String>) -> Self {
        Self::new(service_name).with_identifier_hashing(true)
    }

    /// Configure username hashing
    pub fn with_identifier_hashing(mut self, hash: bool) -> Self {
        self.hash_identifiers = hash;
        self
    }

    /// Service name attached to every event
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Build the record for an event without emitting it
    pub fn record(&self, event: AuthEvent) -> AuditRecord {
        AuditRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            service: self.service_name.clone(),
            event,
        }
    }

    /// Emit an event
    pub fn log(&self, event: AuthEvent) {
        let record = self.record(event);

        match &record.event {
            AuthEvent::Authenticated {
                username,
                method,
                target,
            } => {
                debug!(
                    target: "audit::auth",
                    audit_id = %record.id,
                    event_type = "authenticated",
                    username = %self.maybe_hash(username),
                    method = %method,
                    request_target = %target,
                    service = %self.service_name,
                    "Request authenticated"
                );
            }
            AuthEvent::CredentialRejected {
                attempted_user,
                reason,
            } => {
                warn!(
                    target: "audit::auth",
                    audit_id = %record.id,
                    event_type = "credential_rejected",
                    attempted_user = ?attempted_user.as_deref().map(|u| self.maybe_hash(u)),
                    reason = %reason,
                    service = %self.service_name,
                    "Credential header rejected"
                );
            }
            AuthEvent::TokenRejected { reason } => {
                warn!(
                    target: "audit::auth",
                    audit_id = %record.id,
                    event_type = "token_rejected",
                    reason = %reason,
                    service = %self.service_name,
                    "Session token rejected"
                );
            }
            AuthEvent::AccessDenied { username, target } => {
                warn!(
                    target: "audit::auth",
                    audit_id = %record.id,
                    event_type = "access_denied",
                    username = %self.maybe_hash(username),
                    request_target = %target,
                    service = %self.service_name,
                    "Access denied"
                );
            }
            AuthEvent::TokenIssued {
                username,
                token_id,
                expires_in,
            } => {
                info!(
                    target: "audit::auth",
                    audit_id = %record.id,
                    event_type = "token_issued",
                    username = %self.maybe_hash(username),
                    token_id = %token_id,
                    expires_in_secs = expires_in,
                    service = %self.service_name,
                    "Session token issued"
                );
            }
            AuthEvent::LoginFailure {
                attempted_user,
                reason,
            } => {
                warn!(
                    target: "audit::auth",
                    audit_id = %record.id,
                    event_type = "login_failure",
                    attempted_user = %self.maybe_hash(attempted_user),
                    reason = %reason,
                    service = %self.service_name,
                    "Login failed"
                );
            }
            AuthEvent::InternalFault => {
                error!(
                    target: "audit::auth",
                    audit_id = %record.id,
                    event_type = "internal_fault",
                    service = %self.service_name,
                    "Decision aborted by an internal fault"
                );
            }
        }
    }

    fn maybe_hash(&self, value: &str) -> String {
        if self.hash_identifiers {
            let hash = blake3::hash(value.as_bytes());
            format!("blake3:{}", &hash.to_hex()[..16])
        } else {
            value.to_string()
        }
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new("gatehouse")
    }
}

/// Decision events worth an audit trail
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthEvent {
    /// An identity was established
    Authenticated {
        /// Authenticated username
        username: String,
        /// How it was established
        method: AuthMethod,
        /// `host + path` requested
        target: String,
    },

    /// A credential header was malformed or did not match
    CredentialRejected {
        /// Username from the header, when it could be decoded
        attempted_user: Option<String>,
        /// Failure reason
        reason: String,
    },

    /// A session token failed verification
    TokenRejected {
        /// Failure reason
        reason: String,
    },

    /// An authenticated identity matched none of its routes
    AccessDenied {
        /// Authenticated username
        username: String,
        /// `host + path` requested
        target: String,
    },

    /// A session token was issued
    TokenIssued {
        /// Subject
        username: String,
        /// `jti` of the token
        token_id: String,
        /// Lifetime in seconds
        expires_in: u64,
    },

    /// A login attempt failed
    LoginFailure {
        /// Username presented
        attempted_user: String,
        /// Failure reason
        reason: String,
    },

    /// The decision hit an internal fault. Detail goes to the operational log.
    InternalFault,
}

/// An event with its metadata
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Unique record id
    pub id: Uuid,
    /// When the event was recorded
    pub timestamp: DateTime<Utc>,
    /// Emitting service
    pub service: String,
    /// The event
    pub event: AuthEvent,
}
