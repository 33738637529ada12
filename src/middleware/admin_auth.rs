use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::db::AppState;
use crate::error::AppError;

/// Header carrying the static admin key.
pub const ADMIN_KEY_HEADER: &str = "x-api-key";

/// True if `headers` carry the configured admin key.
/// With no key configured nothing is accepted.
fn is_admin(configured: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = configured else {
        return false;
    };
    let Some(provided) = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    // Key length is not treated as secret
    expected.len() == provided.len() && bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
}

/// Reject requests without a valid `X-API-Key` header with a JSON 401.
pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !is_admin(state.admin_api_key.as_deref(), request.headers()) {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        return Err(AppError::Unauthorized);
    }
    Ok(next.run(request).await)
}
