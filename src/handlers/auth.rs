//! Session validation
//!
//! Sessions are issued by the portal's login service; this service only
//! resolves a presented token to the user it belongs to.

use crate::error::{PortalError, PortalResult};
use crate::models::*;
use axum::{
    http::{header, HeaderMap},
    Extension, Json,
};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

/// Session cookie name
pub const SESSION_COOKIE: &str = "tp_session";

/// Current user
pub async fn get_current_user(
    Extension(user): Extension<CurrentUser>,
) -> Json<ApiResponse<CurrentUser>> {
    Json(ApiResponse::success(user))
}

// =============================================================================
// Session Validation
// =============================================================================

/// Resolve the session token in `headers` to an active user
pub async fn validate_session(
    pool: &PgPool,
    headers: &HeaderMap,
) -> Result<Option<CurrentUser>, sqlx::Error> {
    let token = match extract_session_token(headers) {
        Some(t) => t,
        None => return Ok(None),
    };

    sqlx::query_as::<_, CurrentUser>(
        r#"
        SELECT u.id, u.email, u.role, u.client_id
        FROM user_sessions s
        JOIN portal_users u ON u.id = s.user_id
        WHERE s.token_hash = $1
          AND s.expires_at > NOW()
          AND u.is_active = true
        "#,
    )
    .bind(hash_token(&token))
    .fetch_optional(pool)
    .await
}

// =============================================================================
// Authorization Helpers
// =============================================================================

pub fn ensure_admin(user: &CurrentUser) -> PortalResult<()> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(PortalError::forbidden("Administrator access required"))
    }
}

/// Data owned by `client_id` is visible to admins and to that client's users
pub fn ensure_tenant(user: &CurrentUser, client_id: Uuid) -> PortalResult<()> {
    if user.can_access_client(client_id) {
        Ok(())
    } else {
        Err(PortalError::forbidden("Access to another client's data is not allowed"))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Session token from the session cookie or an `Authorization: Bearer` header
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookie_header) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        for cookie in cookie_header.split(';') {
            let cookie = cookie.trim();
            if let Some(value) = cookie.strip_prefix(&format!("{}=", SESSION_COOKIE)) {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// SHA-256 of the token, hex encoded, as stored in `user_sessions.token_hash`
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
