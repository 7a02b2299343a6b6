//! Router and handlers
//!
//! Every route except `/health` and paths under it sits behind [`AuthLayer`]. The
//! catch-all handler echoes the [`Decision`] the layer attached, which makes
//! the demo useful for poking at route patterns with curl.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use gatehouse_auth::tower::AuthLayer;
use gatehouse_auth::{Authenticator, Decision};

#[derive(Debug, Clone)]
pub struct AppState {
    pub authenticator: Arc<Authenticator>,
}

pub fn build_router(authenticator: Arc<Authenticator>, enforce: bool) -> Router {
    let mut layer = AuthLayer::new(Arc::clone(&authenticator))
        .bypass_path("/health");
    if enforce {
        layer = layer.enforce();
    }

    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .fallback(whoami)
        .layer(layer)
        .with_state(AppState { authenticator })
}

async fn health() -> &'static str {
    "ok"
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.authenticator.cache_stats())
}

/// Requests under a bypassed prefix reach here without a decision
async fn whoami(decision: Option<Extension<Decision>>) -> impl IntoResponse {
    Json(decision.map_or_else(Decision::anonymous, |Extension(decision)| decision))
}
