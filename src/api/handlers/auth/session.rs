//! Session cookie handling and the session endpoints.
//!
//! Sessions are provider-signed cookies. The service never mints or stores
//! its own session state, validation is delegated to the provider on every
//! request.

use crate::api::handlers::auth::{
    profile,
    state::{AuthConfig, AuthState},
    types::{AuthResponse, SessionResponse},
};
use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, instrument};

pub const SESSION_COOKIE_NAME: &str = "session";

/// Set-Cookie value establishing a session.
#[must_use]
pub fn session_cookie(config: &AuthConfig, value: &str) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.session_ttl()
    );

    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }

    cookie
}

/// Set-Cookie value deleting the session cookie.
#[must_use]
pub fn clear_session_cookie(config: &AuthConfig) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");

    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }

    cookie
}

/// Session cookie value from the Cookie header, if present.
#[must_use]
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;

    for pair in cookies.split(';') {
        let pair = pair.trim();
        if let Some(value) = pair.strip_prefix(SESSION_COOKIE_NAME) {
            if let Some(value) = value.strip_prefix('=') {
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    None
}

/// Current session, if any.
#[utoipa::path(
    get,
    path = "/v1/auth/session",
    tag = "auth",
    responses(
        (status = 200, description = "Active session", body = SessionResponse),
        (status = 204, description = "No active session"),
        (status = 500, description = "Storage error"),
    )
)]
#[instrument(skip_all)]
pub async fn session(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    headers: HeaderMap,
) -> Response {
    let Some(cookie) = extract_session_cookie(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let Some(claims) = state.idp().verify_session_cookie(&cookie).await else {
        return StatusCode::NO_CONTENT.into_response();
    };

    match profile::fetch_profile(&pool, &claims.uid).await {
        Ok(Some(profile)) => Json(SessionResponse {
            uid: profile.uid,
            name: profile.name,
            email: profile.email,
            provider: profile.provider,
            email_verified: profile.email_verified,
        })
        .into_response(),
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("failed to load profile for session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// End the session. Idempotent, succeeds whether or not a session exists.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Session cleared", body = AuthResponse),
    )
)]
#[instrument(skip_all)]
pub async fn logout(Extension(state): Extension<Arc<AuthState>>) -> Response {
    (
        StatusCode::OK,
        [
            (header::SET_COOKIE, clear_session_cookie(state.config())),
            (header::CACHE_CONTROL, "no-store".to_string()),
            (header::PRAGMA, "no-cache".to_string()),
        ],
        Json(AuthResponse::ok("Signed out successfully")),
    )
        .into_response()
}
