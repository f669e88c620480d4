//! Sign-in: verify a provider ID token, reconcile the local profile, and
//! establish the session cookie.

use crate::api::handlers::auth::{
    profile,
    rate_limit::{RateLimitAction, RateLimitDecision},
    session,
    signup::credential_error_message,
    state::AuthState,
    types::{AuthResponse, SignInRequest},
    utils,
};
use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub const SIGNIN_OK_MESSAGE: &str = "Signed in successfully.";
pub const VERIFY_FIRST_MESSAGE: &str = "Please verify your email before signing in.";
pub const TOO_MANY_ATTEMPTS_MESSAGE: &str = "Too many attempts. Please try again later.";

/// Sign in with a provider ID token.
#[utoipa::path(
    post,
    path = "/v1/auth/signin",
    tag = "auth",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in, session cookie set", body = AuthResponse),
        (status = 400, description = "Invalid request", body = AuthResponse),
        (status = 401, description = "Credential rejected", body = AuthResponse),
        (status = 403, description = "Email not verified", body = AuthResponse),
        (status = 429, description = "Rate limited", body = AuthResponse),
        (status = 500, description = "Storage error", body = AuthResponse),
    )
)]
#[instrument(skip_all)]
pub async fn signin(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    headers: HeaderMap,
    Json(request): Json<SignInRequest>,
) -> Response {
    if let Some(ip) = utils::extract_client_ip(&headers) {
        if state.rate_limiter().check_ip(RateLimitAction::SignIn, &ip)
            == RateLimitDecision::Limited
        {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(AuthResponse::err(TOO_MANY_ATTEMPTS_MESSAGE)),
            )
                .into_response();
        }
    }

    let email = utils::normalize_email(&request.email);
    if !utils::valid_email(&email) {
        return (
            StatusCode::BAD_REQUEST,
            Json(AuthResponse::err("Please enter a valid email address.")),
        )
            .into_response();
    }

    let decoded = match state.idp().verify_id_token(&request.id_token).await {
        Ok(decoded) => decoded,
        Err(err) => {
            info!(email, "sign-in token rejected: {err}");
            return (
                StatusCode::UNAUTHORIZED,
                Json(AuthResponse::err(credential_error_message(&err))),
            )
                .into_response();
        }
    };

    // The token is the authority on who is signing in
    if decoded.email != email {
        warn!(
            uid = decoded.uid,
            "sign-in email does not match token, using token email"
        );
    }

    // Password accounts must verify their address before a session exists
    if decoded.provider == "email" && !decoded.email_verified {
        return (
            StatusCode::FORBIDDEN,
            Json(AuthResponse::needs_verification(
                decoded.email,
                VERIFY_FIRST_MESSAGE,
            )),
        )
            .into_response();
    }

    if let Err(err) = profile::reconcile_on_sign_in(&pool, &decoded).await {
        error!(uid = decoded.uid, "failed to reconcile profile: {err}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(AuthResponse::err(
                "Something went wrong. Please try again later.",
            )),
        )
            .into_response();
    }

    let cookie = match state
        .idp()
        .create_session_cookie(&request.id_token, state.config().session_ttl())
        .await
    {
        Ok(cookie) => cookie,
        Err(err) => {
            error!(uid = decoded.uid, "failed to create session cookie: {err}");
            return (
                StatusCode::UNAUTHORIZED,
                Json(AuthResponse::err(credential_error_message(&err))),
            )
                .into_response();
        }
    };

    (
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            session::session_cookie(state.config(), &cookie),
        )],
        Json(AuthResponse::ok(SIGNIN_OK_MESSAGE)),
    )
        .into_response()
}
