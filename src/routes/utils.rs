use axum::http::HeaderMap;

use super::auth::{AuthService, Claims};
use crate::db::auth::ROLE_ADMIN;
use crate::error::{AppError, AppResult};

#[inline]
pub fn validate_auth_token(headers: &HeaderMap, service: &AuthService) -> AppResult<Claims> {
    let raw = match headers.get("Authorization").map(|token| token.to_str()) {
        Some(Ok(token)) => token,
        _ => {
            return Err(AppError::Unauthorized);
        }
    };
    // accept both bare tokens and the Bearer scheme
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw);
    service.verify_token(token)
}

#[inline]
pub fn require_admin(headers: &HeaderMap, service: &AuthService) -> AppResult<Claims> {
    let claims = validate_auth_token(headers, service)?;
    if claims.role != ROLE_ADMIN {
        tracing::warn!("admin route refused for user {} ({})", claims.sub, claims.role);
        return Err(AppError::Unauthorized);
    }
    Ok(claims)
}

// guest calls are allowed; a valid token just attributes the record
#[inline]
pub fn optional_user_id(headers: &HeaderMap, service: &AuthService) -> Option<i32> {
    validate_auth_token(headers, service).ok().map(|claims| claims.sub)
}
