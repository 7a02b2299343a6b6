//! Session tokens
//!
//! Tokens are compact JWS structures, `base64url(header).base64url(payload).base64url(signature)`,
//! signed with HS256 under the engine's secret.
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │ registered: iss aud sub routes jti iat nbf exp │
//! ├────────────────────────────────────────────────┤
//! │ public extensions   (caller supplied)          │
//! │ private extensions  (override public)          │
//! └────────────────────────────────────────────────┘
//! ```
//!
//! - `engine` - [`TokenEngine`]: key derivation, signing, verification
//!
//! Payloads are schema checked before any field is trusted: see
//! [`SessionClaims::from_payload`].

pub mod engine;

pub use engine::{IssuedToken, TokenEngine};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::TokenRejection;

/// Claims the engine owns. Extensions can never override these.
pub const REGISTERED_CLAIMS: &[&str] = &["iss", "aud", "sub", "routes", "jti", "iat", "nbf", "exp"];

/// Verified payload of a session token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Subject: the username
    pub sub: String,
    /// Authorized route patterns, in match order
    pub routes: Vec<String>,
    /// Unique token id
    pub jti: String,
    /// Issued at (UTC seconds)
    pub iat: i64,
    /// Not before (UTC seconds)
    pub nbf: i64,
    /// Expires at (UTC seconds)
    pub exp: i64,
    /// Public and private extension claims
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

impl SessionClaims {
    /// Validate the shape of a decoded payload and convert it
    ///
    /// Signature and time checks happen before this; this is the explicit
    /// schema step. `routes` must be an array of strings.
    ///
    /// # Errors
    ///
    /// Returns the first claim that is missing or has the wrong type.
    pub fn from_payload(mut payload: Map<String, Value>) -> Result<Self, TokenRejection> {
        let routes = match payload.remove("routes") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(route) => Ok(route),
                    _ => Err(TokenRejection::InvalidRoutes),
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(TokenRejection::InvalidRoutes),
        };

        let sub = take_string(&mut payload, "sub")?;
        if sub.is_empty() {
            return Err(TokenRejection::InvalidClaims("empty `sub`".to_string()));
        }

        Ok(Self {
            iss: take_string(&mut payload, "iss")?,
            aud: take_string(&mut payload, "aud")?,
            sub,
            routes,
            jti: take_string(&mut payload, "jti")?,
            iat: take_timestamp(&mut payload, "iat")?,
            nbf: take_timestamp(&mut payload, "nbf")?,
            exp: take_timestamp(&mut payload, "exp")?,
            extensions: payload,
        })
    }

    /// Username carried by the token
    #[must_use]
    pub fn username(&self) -> &str {
        &self.sub
    }

    /// Look up an extension claim
    #[must_use]
    pub fn extension(&self, name: &str) -> Option<&Value> {
        self.extensions.get(name)
    }
}

fn take_string(payload: &mut Map<String, Value>, name: &str) -> Result<String, TokenRejection> {
    match payload.remove(name) {
        Some(Value::String(value)) => Ok(value),
        Some(_) => Err(TokenRejection::InvalidClaims(format!(
            "`{name}` must be a string"
        ))),
        None => Err(TokenRejection::MissingClaim(name.to_string())),
    }
}

fn take_timestamp(payload: &mut Map<String, Value>, name: &str) -> Result<i64, TokenRejection> {
    match payload.remove(name) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| TokenRejection::InvalidClaims(format!("`{name}` out of range"))),
        Some(_) => Err(TokenRejection::InvalidClaims(format!(
            "`{name}` must be a number"
        ))),
        None => Err(TokenRejection::MissingClaim(name.to_string())),
    }
}

/// Caller-supplied claims merged into a token at creation
///
/// Public claims go in first, private claims second, so a private claim wins
/// on a key collision. Names in [`REGISTERED_CLAIMS`] are dropped.
///
/// ```rust
/// use gatehouse_auth::token::ClaimExtensions;
/// use serde_json::json;
///
/// let ext = ClaimExtensions::new()
///     .public("tier", json!("free"))
///     .private("tier", json!("pro"));
///
/// assert_eq!(ext.merged().get("tier"), Some(&json!("pro")));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimExtensions {
    public: Map<String, Value>,
    private: Map<String, Value>,
}

impl ClaimExtensions {
    /// No extensions
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a public claim
    #[must_use]
    pub fn public(mut self, name: impl Into<String>, value: Value) -> Self {
        self.public.insert(name.into(), value);
        self
    }

    /// Add a private claim
    #[must_use]
    pub fn private(mut self, name: impl Into<String>, value: Value) -> Self {
        self.private.insert(name.into(), value);
        self
    }

    /// Whether no extension claims are set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.public.is_empty() && self.private.is_empty()
    }

    /// Merge public then private claims, dropping registered names
    #[must_use]
    pub fn merged(&self) -> Map<String, Value> {
        let mut merged = Map::new();
        for (name, value) in self.public.iter().chain(self.private.iter()) {
            if REGISTERED_CLAIMS.contains(&name.as_str()) {
                warn!(claim = %name, "Ignoring extension claim that shadows a registered claim");
                continue;
            }
            merged.insert(name.clone(), value.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test payloads are objects"),
        }
    }

    fn full_payload() -> Value {
        json!({
            "iss": "gatehouse",
            "aud": "example.com",
            "sub": "alice",
            "routes": ["example.com/admin/*"],
            "jti": "7b0c3e1e",
            "iat": 1_700_000_000,
            "nbf": 1_700_000_000,
            "exp": 1_700_003_600,
            "tier": "pro"
        })
    }

    #[test]
    fn test_from_payload_complete() {
        let claims = SessionClaims::from_payload(payload(full_payload())).unwrap();
        assert_eq!(claims.username(), "alice");
        assert_eq!(claims.routes, vec!["example.com/admin/*".to_string()]);
        assert_eq!(claims.exp, 1_700_003_600);
        assert_eq!(claims.extension("tier"), Some(&json!("pro")));
        assert!(claims.extension("routes").is_none());
    }

    #[test]
    fn test_from_payload_missing_routes() {
        let mut value = full_payload();
        value.as_object_mut().unwrap().remove("routes");
        assert_eq!(
            SessionClaims::from_payload(payload(value)),
            Err(TokenRejection::InvalidRoutes)
        );
    }

    #[test]
    fn test_from_payload_routes_not_array() {
        let mut value = full_payload();
        value["routes"] = json!("example.com/*");
        assert_eq!(
            SessionClaims::from_payload(payload(value)),
            Err(TokenRejection::InvalidRoutes)
        );
    }

    #[test]
    fn test_from_payload_routes_with_non_string() {
        let mut value = full_payload();
        value["routes"] = json!(["example.com/*", 42]);
        assert_eq!(
            SessionClaims::from_payload(payload(value)),
            Err(TokenRejection::InvalidRoutes)
        );
    }

    #[test]
    fn test_from_payload_empty_routes_is_valid() {
        let mut value = full_payload();
        value["routes"] = json!([]);
        let claims = SessionClaims::from_payload(payload(value)).unwrap();
        assert!(claims.routes.is_empty());
    }

    #[test]
    fn test_from_payload_missing_jti() {
        let mut value = full_payload();
        value.as_object_mut().unwrap().remove("jti");
        assert_eq!(
            SessionClaims::from_payload(payload(value)),
            Err(TokenRejection::MissingClaim("jti".to_string()))
        );
    }

    #[test]
    fn test_private_claims_override_public() {
        let merged = ClaimExtensions::new()
            .public("tier", json!("free"))
            .public("locale", json!("en"))
            .private("tier", json!("pro"))
            .merged();

        assert_eq!(merged.get("tier"), Some(&json!("pro")));
        assert_eq!(merged.get("locale"), Some(&json!("en")));
    }

    #[test]
    fn test_extensions_cannot_shadow_registered_claims() {
        let merged = ClaimExtensions::new()
            .public("sub", json!("mallory"))
            .private("routes", json!(["*"]))
            .private("team", json!("ops"))
            .merged();

        assert!(!merged.contains_key("sub"));
        assert!(!merged.contains_key("routes"));
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_claims_serialize_flat() {
        let claims = SessionClaims::from_payload(payload(full_payload())).unwrap();
        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value["tier"], json!("pro"));
        assert_eq!(value["sub"], json!("alice"));
        assert!(value.get("extensions").is_none());
    }
}
