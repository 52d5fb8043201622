use crate::state;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use tower_http::trace::TraceLayer;

mod auth;
mod push;

pub fn app(state: state::AppState) -> Router {
    Router::new()
        .route("/api/push/public-key", get(push::push_public_key))
        .route("/api/push/subscriptions", post(push::push_subscribe))
        .route("/api/push/notify", post(push::push_notify))
        .route("/health", get(health))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state, auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
}

pub(crate) async fn health() -> &'static str {
    "ok"
}
