use crate::state;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Serialize)]
struct AuthErrorResponse {
    error: &'static str,
}

/// Requires `Authorization: Bearer <token>` on `/api/` routes other than the
/// public key. Without a configured token those routes stay closed.
pub(crate) async fn auth_middleware(
    State(state): State<state::AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if !path.starts_with("/api/") || is_auth_bypass_path(path) {
        return next.run(req).await;
    }

    if let Some(auth) = &state.auth
        && let Some(token) = bearer_token(req.headers())
        && auth.verify(token)
    {
        return next.run(req).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        Json(AuthErrorResponse {
            error: "unauthorized",
        }),
    )
        .into_response()
}

fn is_auth_bypass_path(path: &str) -> bool {
    path == "/api/push/public-key"
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.trim().split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then_some(token.trim())
        .filter(|token| !token.is_empty())
}
