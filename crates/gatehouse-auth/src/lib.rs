//! # Gatehouse Auth - Request Decision Engine
//!
//! Decides, for every inbound HTTP request, who the caller is and whether
//! that caller may reach the requested `host + path`, without a round trip to
//! the credential backend on the common path.
//!
//! ## Architecture
//!
//! - [`token`] - HS256 session tokens: issuance, verification, claim schema
//! - [`routes`] - Wildcard route patterns and request targets
//! - [`cache`] - Verified-token and resolved-authorization caches
//! - [`store`] - Credential backend trait and its TTL-cached view
//! - [`credentials`] - The `username:secret` credential header
//! - [`authenticator`] - The per-request state machine producing a [`Decision`]
//! - [`request`] - Reading token, credential and target from a request
//! - [`audit`] - Structured audit events under the `audit::auth` target
//! - [`config`] - [`EngineConfig`] loading and validation
//! - `tower` - [`AuthLayer`](crate::tower::AuthLayer) middleware (feature `middleware`)
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use gatehouse_auth::{AuthRequest, Authenticator, EngineConfig, MemoryBackend, RequestTarget};
//! use gatehouse_auth::token::ClaimExtensions;
//!
//! # tokio_test::block_on(async {
//! let backend = Arc::new(MemoryBackend::new());
//! backend.put_user("alice", "wonderland", &["example.com/admin/*"]).await.unwrap();
//!
//! let config = EngineConfig::builder()
//!     .secret("a-very-long-signing-secret-for-tests-0123456789")
//!     .session_ttl_secs(3600)
//!     .build();
//! let auth = Authenticator::new(&config, backend).unwrap();
//!
//! let token = auth
//!     .issue_token("alice", &["example.com/admin/*".to_string()], &ClaimExtensions::new())
//!     .unwrap()
//!     .token;
//!
//! let request = AuthRequest::new(RequestTarget::new("example.com", "/admin/x")).with_token(token);
//! let decision = auth.decide(&request).await;
//! assert!(decision.is_authed && decision.is_authorized);
//! assert_eq!(decision.matched_route.as_deref(), Some("example.com/admin/*"));
//! # });
//! ```
//!
//! ## Feature Flags
//!
//! - `middleware` (default) - Tower layer and service
//! - `metrics` - Decision and cache counters through the `metrics` facade
//! - `full` - Everything

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod audit;
pub mod authenticator;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod decision;
pub mod error;
pub mod request;
pub mod routes;
pub mod store;
pub mod token;

mod auth_metrics;

#[cfg(feature = "middleware")]
#[cfg_attr(docsrs, doc(cfg(feature = "middleware")))]
pub mod tower;

#[doc(inline)]
pub use authenticator::{AuthCacheStats, Authenticator, IssuedSession};
#[doc(inline)]
pub use cache::{AuthzCache, CacheStats, HighWaterCache, TokenCache};
#[doc(inline)]
pub use config::{CacheLimits, EngineConfig, EngineConfigBuilder};
#[doc(inline)]
pub use decision::{AuthMethod, Decision};
#[doc(inline)]
pub use error::{
    AuthError, ConfigError, CredentialError, LoginError, RouteError, StoreError, TokenError,
    TokenRejection,
};
#[doc(inline)]
pub use request::{AuthRequest, CredentialSources};
#[doc(inline)]
pub use routes::{RequestTarget, RouteDecision, RouteMatcher};
#[doc(inline)]
pub use store::{CredentialStore, MemoryBackend, User, UserBackend};
#[doc(inline)]
pub use token::{SessionClaims, TokenEngine};

pub use auth_metrics::init_metrics;
