//! # Tower middleware
//!
//! [`AuthLayer`] runs [`Authenticator::decide`](crate::Authenticator::decide)
//! for every `http::Request` and inserts the resulting
//! [`Decision`](crate::Decision) into the request's extensions.
//!
//! With `enforce` off (the default) every request is forwarded and the inner
//! service reads the decision itself. With `enforce` on, requests that are not
//! authenticated get `401` and authenticated but unauthorized requests get
//! `403`, without reaching the inner service.
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use gatehouse_auth::tower::{AuthLayer, AuthLayerConfig};
//!
//! let service = ServiceBuilder::new()
//!     .layer(AuthLayer::with_config(authenticator, AuthLayerConfig::enforcing()))
//!     .service(my_inner_service);
//! ```
//!
//! In a handler:
//!
//! ```rust,ignore
//! if let Some(decision) = req.extensions().get::<Decision>() {
//!     println!("user: {:?}", decision.username);
//! }
//! ```

mod layer;
mod service;

pub use layer::AuthLayer;
pub use service::{AuthService, AuthServiceFuture};

/// Configuration for the auth layer
#[derive(Debug, Clone, Default)]
pub struct AuthLayerConfig {
    /// Reject requests that are not allowed instead of forwarding them
    pub enforce: bool,
    /// Path prefixes forwarded without a decision (e.g. `/health`)
    pub bypass_paths: Vec<String>,
}

impl AuthLayerConfig {
    /// Configuration that rejects disallowed requests
    #[must_use]
    pub fn enforcing() -> Self {
        Self {
            enforce: true,
            ..Default::default()
        }
    }

    /// Add a path prefix that skips authentication
    #[must_use]
    pub fn bypass_path(mut self, prefix: impl Into<String>) -> Self {
        self.bypass_paths.push(prefix.into());
        self
    }

    /// Check if a path skips authentication
    #[must_use]
    pub fn should_bypass(&self, path: &str) -> bool {
        self.bypass_paths.iter().any(|prefix| {
            path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| prefix.ends_with('/') || rest.starts_with('/'))
        })
    }
}
