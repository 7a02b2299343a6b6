//! Tower Service implementation for authentication
//!
//! Works with any `http::Request<B>` service (Axum, hyper, tower-http stacks).
//! Rejections are produced here as small JSON bodies, so the response body
//! type only needs `From<String>`.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use tower_service::Service;
use tracing::debug;

use crate::Authenticator;
use crate::decision::Decision;

use super::AuthLayerConfig;

/// Tower Service that attaches a [`Decision`] to every request
#[derive(Debug, Clone)]
pub struct AuthService<S> {
    inner: S,
    authenticator: Arc<Authenticator>,
    config: AuthLayerConfig,
}

impl<S> AuthService<S> {
    /// Create a new auth service
    pub fn new(inner: S, authenticator: Arc<Authenticator>, config: AuthLayerConfig) -> Self {
        Self {
            inner,
            authenticator,
            config,
        }
    }
}

/// Future type for auth service responses
pub type AuthServiceFuture<T, E> = BoxFuture<'static, Result<T, E>>;

impl<S, B, ResBody> Service<http::Request<B>> for AuthService<S>
where
    S: Service<http::Request<B>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send + 'static,
    B: Send + 'static,
    ResBody: From<String> + Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = S::Error;
    type Future = AuthServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        // The clone may not be ready; keep the driven instance and hand it off
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if self.config.should_bypass(req.uri().path()) {
            return Box::pin(async move { inner.call(req).await });
        }

        let authenticator = Arc::clone(&self.authenticator);
        let enforce = self.config.enforce;

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            let request = authenticator.request_from_parts(&parts);
            let decision = authenticator.decide(&request).await;

            if enforce && !decision.is_allowed() {
                debug!(
                    authed = decision.is_authed,
                    method = ?decision.method,
                    "Request rejected by auth layer"
                );
                return Ok(rejection(&decision));
            }

            parts.extensions.insert(decision);
            inner.call(http::Request::from_parts(parts, body)).await
        })
    }
}

fn rejection<ResBody: From<String>>(decision: &Decision) -> http::Response<ResBody> {
    let (status, fallback) = if decision.is_authed {
        (StatusCode::FORBIDDEN, "forbidden")
    } else {
        (StatusCode::UNAUTHORIZED, "authentication required")
    };
    let body = serde_json::json!({
        "error": decision.error.as_deref().unwrap_or(fallback),
        "timestamp": decision.timestamp,
    });

    let mut response = http::Response::new(ResBody::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
