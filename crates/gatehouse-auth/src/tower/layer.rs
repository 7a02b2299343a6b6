//! Tower Layer implementation for authentication

use std::sync::Arc;
use tower::Layer;

use crate::Authenticator;

use super::AuthLayerConfig;
use super::service::AuthService;

/// Tower Layer that wraps services with [`AuthService`]
#[derive(Debug, Clone)]
pub struct AuthLayer {
    authenticator: Arc<Authenticator>,
    config: AuthLayerConfig,
}

impl AuthLayer {
    /// Create a layer that annotates requests without rejecting any
    pub fn new(authenticator: Arc<Authenticator>) -> Self {
        Self::with_config(authenticator, AuthLayerConfig::default())
    }

    /// Create a layer with custom configuration
    pub fn with_config(authenticator: Arc<Authenticator>, config: AuthLayerConfig) -> Self {
        Self {
            authenticator,
            config,
        }
    }

    /// Reject disallowed requests
    #[must_use]
    pub fn enforce(mut self) -> Self {
        self.config.enforce = true;
        self
    }

    /// Add a path prefix that skips authentication
    #[must_use]
    pub fn bypass_path(mut self, prefix: impl Into<String>) -> Self {
        self.config.bypass_paths.push(prefix.into());
        self
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthService::new(inner, Arc::clone(&self.authenticator), self.config.clone())
    }
}
