//! Password reset: request a link, redeem it for a new password.

use crate::{
    api::handlers::auth::{
        rate_limit::{RateLimitAction, RateLimitDecision},
        signup::credential_error_message,
        state::AuthState,
        tokens::{self, RedeemOutcome, TokenPurpose},
        types::{AuthResponse, EmailRequest, ResetPasswordRequest},
        utils,
    },
    idp::CredentialError,
    mailer,
};
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use secrecy::SecretString;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// One answer for every input. The endpoint must not reveal which
/// addresses have accounts.
pub const RESET_REQUEST_MESSAGE: &str =
    "If an account exists for this address, a password reset link has been sent.";
pub const RESET_INVALID_MESSAGE: &str = "This password reset link is invalid or has expired.";
pub const RESET_DONE_MESSAGE: &str =
    "Password has been reset successfully. You can now sign in with your new password.";

/// Request a password reset link.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    tag = "auth",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Accepted, same body for every input", body = AuthResponse),
        (status = 429, description = "Rate limited", body = AuthResponse),
    )
)]
#[instrument(skip_all)]
pub async fn forgot_password(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    headers: HeaderMap,
    Json(request): Json<EmailRequest>,
) -> Response {
    if let Some(ip) = utils::extract_client_ip(&headers) {
        if state
            .rate_limiter()
            .check_ip(RateLimitAction::ForgotPassword, &ip)
            == RateLimitDecision::Limited
        {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(AuthResponse::err("Too many attempts. Please try again later.")),
            )
                .into_response();
        }
    }

    let accepted =
        (StatusCode::OK, Json(AuthResponse::ok(RESET_REQUEST_MESSAGE))).into_response();

    let email = utils::normalize_email(&request.email);
    if !utils::valid_email(&email) {
        return accepted;
    }

    // The lookup and email run after the response. Response timing must not
    // depend on whether the account exists.
    tokio::spawn(async move {
        match state.idp().get_user_by_email(&email).await {
            Ok(Some(_)) => send_reset_email(&state, &pool, &email).await,
            Ok(None) => info!(email, "reset requested for unknown account"),
            Err(err) => error!(email, "provider lookup failed during reset request: {err}"),
        }
    });

    accepted
}

async fn send_reset_email(state: &AuthState, pool: &PgPool, email: &str) {
    let token = match tokens::issue_token(
        pool,
        email,
        TokenPurpose::ResetPassword,
        state.config().reset_token_ttl(),
    )
    .await
    {
        Ok(token) => token,
        Err(err) => {
            error!(email, "failed to issue reset token: {err}");
            return;
        }
    };

    let url = utils::build_reset_url(state.config().frontend_base_url(), &token);
    let (subject, html) = mailer::password_reset_email(&url);

    if let Err(err) = state.mailer().send(email, &subject, &html).await {
        error!(email, "failed to send reset email: {err}");
    }
}

/// Redeem a reset link and set a new password.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    tag = "auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = AuthResponse),
        (status = 400, description = "Invalid link or weak password", body = AuthResponse),
        (status = 500, description = "Provider or storage error", body = AuthResponse),
    )
)]
#[instrument(skip_all)]
pub async fn reset_password(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    Json(request): Json<ResetPasswordRequest>,
) -> Response {
    if request.token.is_empty() || request.new_password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(AuthResponse::err(RESET_INVALID_MESSAGE)),
        )
            .into_response();
    }

    let email = match tokens::redeem_token(&pool, &request.token, TokenPurpose::ResetPassword)
        .await
    {
        Ok(RedeemOutcome::Redeemed { email }) => email,
        Ok(RedeemOutcome::NotFound) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(AuthResponse::err(RESET_INVALID_MESSAGE)),
            )
                .into_response();
        }
        Err(err) => {
            error!("failed to redeem reset token: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AuthResponse::err(
                    "Something went wrong. Please try again later.",
                )),
            )
                .into_response();
        }
    };

    let user = match state.idp().get_user_by_email(&email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            info!(email, "reset token for unknown account");
            return (
                StatusCode::BAD_REQUEST,
                Json(AuthResponse::err(RESET_INVALID_MESSAGE)),
            )
                .into_response();
        }
        Err(err) => {
            error!(email, "provider lookup failed during reset: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AuthResponse::err(
                    "Something went wrong. Please try again later.",
                )),
            )
                .into_response();
        }
    };

    let new_password = SecretString::from(request.new_password);
    if let Err(err) = state.idp().update_password(&user.uid, &new_password).await {
        let status = match err {
            CredentialError::WeakPassword => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        return (status, Json(AuthResponse::err(credential_error_message(&err))))
            .into_response();
    }

    (StatusCode::OK, Json(AuthResponse::ok(RESET_DONE_MESSAGE))).into_response()
}
