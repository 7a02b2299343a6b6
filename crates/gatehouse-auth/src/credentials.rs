//! Programmatic credential header
//!
//! The header carries `base64(username:secret)`, optionally prefixed with
//! `Basic `. The decoded value is split on the first `:` only, so secrets may
//! themselves contain colons.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::error::CredentialError;

/// Username and secret decoded from the credential header
#[derive(Debug)]
pub struct HeaderCredentials {
    /// Claimed username
    pub username: String,
    /// Presented secret
    pub secret: SecretString,
}

impl HeaderCredentials {
    /// Decode a credential header value
    ///
    /// # Errors
    ///
    /// Returns a malformed-header [`CredentialError`] on bad base64, non UTF-8
    /// content, a missing `:` or an empty username.
    pub fn parse(header: &str) -> Result<Self, CredentialError> {
        let header = header.trim();
        let encoded = strip_basic_prefix(header).unwrap_or(header).trim();

        let decoded = STANDARD
            .decode(encoded)
            .map_err(|_| CredentialError::InvalidEncoding)?;
        let decoded = String::from_utf8(decoded).map_err(|_| CredentialError::InvalidUtf8)?;

        let (username, secret) = decoded
            .split_once(':')
            .ok_or(CredentialError::MissingDelimiter)?;
        if username.is_empty() {
            return Err(CredentialError::EmptyUsername);
        }

        Ok(Self {
            username: username.to_string(),
            secret: SecretString::new(secret.to_string()),
        })
    }

    /// Encode credentials the way clients send them (without the prefix)
    pub fn encode(username: &str, secret: &str) -> String {
        STANDARD.encode(format!("{username}:{secret}"))
    }
}

fn strip_basic_prefix(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    scheme.eq_ignore_ascii_case("basic").then_some(rest)
}

/// Compare two secrets without leaking where they differ
///
/// Both sides are hashed to a fixed width first, so neither content nor
/// length is observable through timing.
#[must_use]
pub fn secrets_match(provided: &SecretString, expected: &SecretString) -> bool {
    let provided = blake3::hash(provided.expose_secret().as_bytes());
    let expected = blake3::hash(expected.expose_secret().as_bytes());
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_prefixed() {
        let encoded = HeaderCredentials::encode("alice", "wonderland");

        let creds = HeaderCredentials::parse(&encoded).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.secret.expose_secret(), "wonderland");

        let creds = HeaderCredentials::parse(&format!("Basic {encoded}")).unwrap();
        assert_eq!(creds.username, "alice");

        let creds = HeaderCredentials::parse(&format!("basic  {encoded}")).unwrap();
        assert_eq!(creds.username, "alice");
    }

    #[test]
    fn test_split_on_first_colon_only() {
        let encoded = HeaderCredentials::encode("svc", "a:b:c");
        let creds = HeaderCredentials::parse(&encoded).unwrap();
        assert_eq!(creds.username, "svc");
        assert_eq!(creds.secret.expose_secret(), "a:b:c");
    }

    #[test]
    fn test_empty_secret_is_allowed_to_parse() {
        let creds = HeaderCredentials::parse(&HeaderCredentials::encode("svc", "")).unwrap();
        assert_eq!(creds.secret.expose_secret(), "");
    }

    #[test]
    fn test_malformed_headers() {
        assert_eq!(
            HeaderCredentials::parse("not base64!").unwrap_err(),
            CredentialError::InvalidEncoding
        );
        assert_eq!(
            HeaderCredentials::parse(&STANDARD.encode("no-delimiter")).unwrap_err(),
            CredentialError::MissingDelimiter
        );
        assert_eq!(
            HeaderCredentials::parse(&STANDARD.encode(":secret")).unwrap_err(),
            CredentialError::EmptyUsername
        );
        assert_eq!(
            HeaderCredentials::parse(&STANDARD.encode([0xff, 0xfe, b':', b'x'])).unwrap_err(),
            CredentialError::InvalidUtf8
        );
    }

    #[test]
    fn test_secrets_match() {
        let stored = SecretString::new("correct horse".to_string());
        assert!(secrets_match(&SecretString::new("correct horse".to_string()), &stored));
        assert!(!secrets_match(&SecretString::new("correct horsE".to_string()), &stored));
        assert!(!secrets_match(&SecretString::new(String::new()), &stored));
    }
}
