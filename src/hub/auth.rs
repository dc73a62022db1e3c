//! Bearer token check for upgrade requests
//!
//! Only WebSocket upgrades are guarded; the health page stays public.
//! Tokens are accepted from the `Authorization: Bearer` header or a `token`
//! query parameter and compared in constant time.

use super::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use tracing::debug;

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(secret) = state.secret.as_deref() else {
        return Ok(next.run(req).await);
    };

    if !is_websocket_upgrade(req.headers()) {
        return Ok(next.run(req).await);
    }

    if let Some(token) = query_token(req.uri().query()) {
        if constant_time_eq(token.as_bytes(), secret.as_bytes()) {
            debug!("Auth successful via query param");
            return Ok(next.run(req).await);
        }
    }

    if let Some(token) = bearer_token(req.headers()) {
        if constant_time_eq(token.as_bytes(), secret.as_bytes()) {
            debug!("Auth successful via Bearer token");
            return Ok(next.run(req).await);
        }
    }

    debug!("Auth failed - missing or invalid token");
    Err(StatusCode::UNAUTHORIZED)
}

/// Whether the request asks for a WebSocket upgrade
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn query_token(query: Option<&str>) -> Option<String> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("token="))
        .map(|token| urlencoding::decode(token).map(|t| t.into_owned()).unwrap_or_default())
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
