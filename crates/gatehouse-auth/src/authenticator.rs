//! Per-request authentication and authorization
//!
//! [`Authenticator::decide`] runs a fixed sequence and stops authenticating at
//! the first step that establishes an identity:
//!
//! ```text
//!  token in cache? ──yes──► jwt-cache ─┐
//!        │no                           │
//!  credential header ok? ──yes──► header ─┤
//!        │no (error recorded)          │
//!  token verifies? ──yes──► jwt ───────┤──► authz cache / route match
//!        │no ("invalid or expired")    │
//!        ▼                             │
//!  not authenticated                   ▼
//!                                   Decision
//! ```
//!
//! Nothing escapes `decide`: an internal `Err` or a panic anywhere in the
//! sequence becomes a generic internal-error decision, with the detail only
//! in the log.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use secrecy::SecretString;
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::audit::{AuditLogger, AuthEvent};
use crate::auth_metrics as metrics;
use crate::cache::{AuthzCache, AuthzKey, CacheStats, TokenCache};
use crate::config::EngineConfig;
use crate::credentials::HeaderCredentials;
use crate::decision::{AuthMethod, Decision, INVALID_TOKEN_MESSAGE};
use crate::error::{AuthResult, ConfigError, CredentialError, LoginError, TokenError};
use crate::request::{AuthRequest, CredentialSources};
use crate::routes::{RouteDecision, RouteMatcher};
use crate::store::{CredentialStore, User, UserBackend};
use crate::token::{ClaimExtensions, IssuedToken, SessionClaims, TokenEngine};

/// Where an established identity came from
#[derive(Debug, Clone)]
enum Identity {
    Token(Arc<SessionClaims>),
    User(Arc<User>),
}

impl Identity {
    fn username(&self) -> &str {
        match self {
            Self::Token(claims) => claims.username(),
            Self::User(user) => &user.username,
        }
    }

    fn routes(&self) -> &[String] {
        match self {
            Self::Token(claims) => &claims.routes,
            Self::User(user) => &user.routes,
        }
    }

    fn payload(&self) -> Option<Arc<SessionClaims>> {
        match self {
            Self::Token(claims) => Some(Arc::clone(claims)),
            Self::User(_) => None,
        }
    }
}

/// A session created by [`Authenticator::login`]
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// Compact session token
    pub token: String,
    /// Claims inside the token
    pub claims: Arc<SessionClaims>,
    /// `Set-Cookie` value carrying the token
    pub set_cookie: String,
}

/// Snapshot of every cache the authenticator owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthCacheStats {
    /// Verified-token cache
    pub token: CacheStats,
    /// Resolved-authorization cache
    pub authz: CacheStats,
    /// Usernames cached by the credential store
    pub users: u64,
}

/// The decision engine
#[derive(Debug)]
pub struct Authenticator {
    tokens: TokenEngine,
    store: CredentialStore,
    token_cache: Arc<TokenCache>,
    authz_cache: Arc<AuthzCache>,
    routes: Arc<RouteMatcher>,
    sources: CredentialSources,
    audit: AuditLogger,
}

impl Authenticator {
    /// Build an authenticator from configuration
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration does not validate. A
    /// missing, weak or placeholder secret always fails here.
    pub fn new(config: &EngineConfig, backend: Arc<dyn UserBackend>) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self::from_parts(
            TokenEngine::from_config(config)?,
            CredentialStore::new(backend, &config.user_cache),
            Arc::new(TokenCache::new(
                config.token_cache.ttl(),
                config.token_cache.limits(),
            )),
            Arc::new(AuthzCache::new(config.authz_cache)),
            CredentialSources::from_config(config)?,
        ))
    }

    /// Assemble an authenticator from existing components
    ///
    /// Caches are shared through `Arc`, so several authenticators (or a test)
    /// can observe the same instances.
    pub fn from_parts(
        tokens: TokenEngine,
        store: CredentialStore,
        token_cache: Arc<TokenCache>,
        authz_cache: Arc<AuthzCache>,
        sources: CredentialSources,
    ) -> Self {
        Self {
            tokens,
            store,
            token_cache,
            authz_cache,
            routes: Arc::new(RouteMatcher::new()),
            sources,
            audit: AuditLogger::default(),
        }
    }

    /// Use a shared route matcher
    #[must_use]
    pub fn with_route_matcher(mut self, routes: Arc<RouteMatcher>) -> Self {
        self.routes = routes;
        self
    }

    /// Use a specific audit logger
    #[must_use]
    pub fn with_audit_logger(mut self, audit: AuditLogger) -> Self {
        self.audit = audit;
        self
    }

    /// Token engine
    pub fn tokens(&self) -> &TokenEngine {
        &self.tokens
    }

    /// Credential store
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Verified-token cache
    pub fn token_cache(&self) -> &Arc<TokenCache> {
        &self.token_cache
    }

    /// Resolved-authorization cache
    pub fn authz_cache(&self) -> &Arc<AuthzCache> {
        &self.authz_cache
    }

    /// Audit logger decision events go to
    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Cookie and header names credentials are read from
    pub fn sources(&self) -> &CredentialSources {
        &self.sources
    }

    /// Read the decision inputs from request parts
    pub fn request_from_parts(&self, parts: &http::request::Parts) -> AuthRequest {
        AuthRequest::from_parts(parts, &self.sources)
    }

    /// Decide whether a request is authenticated and authorized
    ///
    /// Always returns a well-formed decision.
    #[instrument(skip_all, fields(request_target = %request.target))]
    pub async fn decide(&self, request: &AuthRequest) -> Decision {
        let started = Instant::now();

        let decision = match AssertUnwindSafe(self.evaluate(request))
            .catch_unwind()
            .await
        {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                error!(error = %e, "Authentication decision failed");
                self.audit.log(AuthEvent::InternalFault);
                Decision::internal_error()
            }
            Err(panic) => {
                error!(panic = %panic_message(panic.as_ref()), "Authentication decision panicked");
                self.audit.log(AuthEvent::InternalFault);
                Decision::internal_error()
            }
        };

        metrics::record_decision(&decision, started.elapsed().as_secs_f64());
        decision
    }

    async fn evaluate(&self, request: &AuthRequest) -> AuthResult<Decision> {
        let mut decision = Decision::anonymous();
        let mut identity = None;

        if let Some(token) = request.token.as_deref() {
            let cached = self.token_cache.get(token);
            metrics::record_cache_lookup("token", cached.is_some());
            if let Some(claims) = cached {
                debug!(subject = %claims.sub, "Token cache hit");
                identity = Some((Identity::Token(claims), AuthMethod::JwtCache));
            }
        }

        if identity.is_none()
            && let Some(header) = request.credential.as_deref()
        {
            match self.authenticate_header(header).await {
                Ok(user) => identity = Some((Identity::User(user), AuthMethod::Header)),
                Err(e) => decision.error = Some(e.to_string()),
            }
        }

        if identity.is_none()
            && let Some(token) = request.token.as_deref()
        {
            match self.tokens.inspect(token) {
                Ok(claims) => {
                    let claims = Arc::new(claims);
                    self.token_cache.insert(token, Arc::clone(&claims));
                    identity = Some((Identity::Token(claims), AuthMethod::Jwt));
                }
                Err(rejection) => {
                    debug!(reason = %rejection, "Session token rejected");
                    self.audit.log(AuthEvent::TokenRejected {
                        reason: rejection.to_string(),
                    });
                    decision.error = Some(INVALID_TOKEN_MESSAGE.to_string());
                }
            }
        }

        let Some((identity, method)) = identity else {
            decision.is_authorized = false;
            if decision.error.is_some() {
                decision.method = Some(AuthMethod::Error);
            }
            return Ok(decision);
        };

        // An earlier failed attempt no longer describes the outcome
        decision.error = None;
        decision.is_authed = true;
        decision.method = Some(method);
        decision.username = Some(identity.username().to_string());
        decision.payload = identity.payload();

        let target = request.target.as_match_string();
        let route = self.authorize(&identity, &target)?;

        if route.is_authorized {
            self.audit.log(AuthEvent::Authenticated {
                username: identity.username().to_string(),
                method,
                target,
            });
        } else {
            decision.error = Some(format!(
                "user '{}' is not authorized for {target}",
                identity.username()
            ));
            self.audit.log(AuthEvent::AccessDenied {
                username: identity.username().to_string(),
                target,
            });
        }

        decision.is_authorized = route.is_authorized;
        decision.matched_route = route.matched_route;
        Ok(decision)
    }

    async fn authenticate_header(&self, header: &str) -> Result<Arc<User>, CredentialError> {
        let credentials = HeaderCredentials::parse(header).inspect_err(|e| {
            self.audit.log(AuthEvent::CredentialRejected {
                attempted_user: None,
                reason: e.to_string(),
            });
        })?;

        self.store
            .verify_password(&credentials.username, &credentials.secret)
            .await
            .inspect_err(|e| {
                self.audit.log(AuthEvent::CredentialRejected {
                    attempted_user: Some(credentials.username.clone()),
                    reason: e.to_string(),
                });
            })
    }

    fn authorize(&self, identity: &Identity, target: &str) -> AuthResult<RouteDecision> {
        let key = AuthzKey::new(identity.username(), target);

        if let Some(route) = self.authz_cache.get(&key) {
            metrics::record_cache_lookup("authz", true);
            return Ok(route);
        }
        metrics::record_cache_lookup("authz", false);

        let route = self.routes.authorize(target, Some(identity.routes()))?;
        self.authz_cache.insert(key, route.clone());
        Ok(route)
    }

    /// Check a username and password and issue a session
    ///
    /// # Errors
    ///
    /// Returns [`LoginError::Credentials`] for an unknown user or wrong
    /// password, or [`LoginError::Token`] if signing fails.
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<IssuedSession, LoginError> {
        let user = match self.store.verify_password(username, password).await {
            Ok(user) => user,
            Err(e) => {
                self.audit.log(AuthEvent::LoginFailure {
                    attempted_user: username.to_string(),
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let issued = self.issue_token(&user.username, &user.routes, &ClaimExtensions::new())?;
        let set_cookie = self.session_cookie(&issued.token);

        Ok(IssuedSession {
            token: issued.token,
            claims: Arc::new(issued.claims),
            set_cookie,
        })
    }

    /// Issue a session token for an already-authenticated user
    ///
    /// # Errors
    ///
    /// See [`TokenEngine::issue`].
    pub fn issue_token(
        &self,
        username: &str,
        routes: &[String],
        extensions: &ClaimExtensions,
    ) -> Result<IssuedToken, TokenError> {
        let issued = self.tokens.issue(username, routes, extensions)?;
        self.audit.log(AuthEvent::TokenIssued {
            username: issued.claims.sub.clone(),
            token_id: issued.claims.jti.clone(),
            expires_in: self.tokens.session_ttl().as_secs(),
        });
        Ok(issued)
    }

    /// `Set-Cookie` value for a session token
    pub fn session_cookie(&self, token: &str) -> String {
        format!(
            "{}={token}; Path=/; Max-Age={}; HttpOnly; Secure; SameSite=Lax",
            self.sources.cookie_name(),
            self.tokens.session_ttl().as_secs()
        )
    }

    /// `Set-Cookie` value that clears the session cookie
    pub fn logout_cookie(&self) -> String {
        format!(
            "{}=; Path=/; Max-Age=0; HttpOnly; Secure; SameSite=Lax",
            self.sources.cookie_name()
        )
    }

    /// Forget a user's cached record and authorizations
    pub async fn invalidate_user(&self, username: &str) {
        self.store.invalidate(username).await;
        let dropped = self.authz_cache.invalidate_user(username);
        debug!(username, dropped, "Invalidated cached user state");
    }

    /// Snapshot of cache statistics
    pub fn cache_stats(&self) -> AuthCacheStats {
        AuthCacheStats {
            token: self.token_cache.stats(),
            authz: self.authz_cache.stats(),
            users: self.store.cached_len(),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
