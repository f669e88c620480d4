//! Email verification: redeem links and resend them.

use crate::api::handlers::auth::{
    profile,
    rate_limit::{RateLimitAction, RateLimitDecision},
    signup::send_verification_email,
    state::AuthState,
    tokens::{self, RedeemOutcome, TokenPurpose},
    types::{AuthResponse, EmailRequest, VerifyEmailRequest},
    utils,
};
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub const VERIFIED_MESSAGE: &str = "Email verified successfully. You can now sign in.";
pub const INVALID_LINK_MESSAGE: &str = "Invalid or expired verification link.";
pub const RESEND_SENT_MESSAGE: &str = "Verification email sent. Please check your inbox.";
pub const ALREADY_VERIFIED_MESSAGE: &str = "Your email is already verified. Please sign in.";
pub const NO_ACCOUNT_MESSAGE: &str = "No account found with this email address.";
pub const RESEND_COOLDOWN_MESSAGE: &str = "Please wait before requesting another email.";

fn generic_failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(AuthResponse::err(
            "Something went wrong. Please try again later.",
        )),
    )
        .into_response()
}

/// Redeem a verification link.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    tag = "auth",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = AuthResponse),
        (status = 400, description = "Invalid or expired link", body = AuthResponse),
        (status = 429, description = "Rate limited", body = AuthResponse),
        (status = 500, description = "Provider or storage error", body = AuthResponse),
    )
)]
#[instrument(skip_all)]
pub async fn verify_email(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    headers: HeaderMap,
    Json(request): Json<VerifyEmailRequest>,
) -> Response {
    if let Some(ip) = utils::extract_client_ip(&headers) {
        if state
            .rate_limiter()
            .check_ip(RateLimitAction::VerifyEmail, &ip)
            == RateLimitDecision::Limited
        {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(AuthResponse::err("Too many attempts. Please try again later.")),
            )
                .into_response();
        }
    }

    if request.token.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(AuthResponse::err(INVALID_LINK_MESSAGE)),
        )
            .into_response();
    }

    let email = match tokens::redeem_token(&pool, &request.token, TokenPurpose::VerifyEmail).await
    {
        Ok(RedeemOutcome::Redeemed { email }) => email,
        Ok(RedeemOutcome::NotFound) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(AuthResponse::err(INVALID_LINK_MESSAGE)),
            )
                .into_response();
        }
        Err(err) => {
            error!("failed to redeem verification token: {err}");
            return generic_failure();
        }
    };

    // The token is consumed at this point. The provider flip must succeed or
    // the user is stuck with a spent link, so treat its failure as an error.
    let user = match state.idp().get_user_by_email(&email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            info!(email, "verification token for unknown account");
            return (
                StatusCode::BAD_REQUEST,
                Json(AuthResponse::err(INVALID_LINK_MESSAGE)),
            )
                .into_response();
        }
        Err(err) => {
            error!(email, "provider lookup failed during verification: {err}");
            return generic_failure();
        }
    };

    if let Err(err) = state.idp().set_email_verified(&user.uid).await {
        error!(uid = user.uid, "failed to flip provider verified flag: {err}");
        return generic_failure();
    }

    // Local flag is best effort, sign-in reconciliation will catch up
    if let Err(err) = profile::mark_email_verified(&pool, &email).await {
        warn!(email, "failed to update local verified flag: {err}");
    }

    (StatusCode::OK, Json(AuthResponse::ok(VERIFIED_MESSAGE))).into_response()
}

/// Send a fresh verification link.
#[utoipa::path(
    post,
    path = "/v1/auth/resend-verification",
    tag = "auth",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Email sent or already verified", body = AuthResponse),
        (status = 400, description = "Invalid request", body = AuthResponse),
        (status = 404, description = "No such account", body = AuthResponse),
        (status = 429, description = "Rate limited", body = AuthResponse),
        (status = 500, description = "Provider error", body = AuthResponse),
    )
)]
#[instrument(skip_all)]
pub async fn resend_verification(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    Json(request): Json<EmailRequest>,
) -> Response {
    let email = utils::normalize_email(&request.email);
    if !utils::valid_email(&email) {
        return (
            StatusCode::BAD_REQUEST,
            Json(AuthResponse::err("Please enter a valid email address.")),
        )
            .into_response();
    }

    if state
        .rate_limiter()
        .check_email(RateLimitAction::ResendVerification, &email)
        == RateLimitDecision::Limited
    {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(AuthResponse::err(RESEND_COOLDOWN_MESSAGE)),
        )
            .into_response();
    }

    let user = match state.idp().get_user_by_email(&email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(AuthResponse::err(NO_ACCOUNT_MESSAGE)),
            )
                .into_response();
        }
        Err(err) => {
            error!(email, "provider lookup failed during resend: {err}");
            return generic_failure();
        }
    };

    if user.email_verified {
        return (
            StatusCode::OK,
            Json(AuthResponse::ok(ALREADY_VERIFIED_MESSAGE)),
        )
            .into_response();
    }

    send_verification_email(&state, &pool, &email).await;

    (StatusCode::OK, Json(AuthResponse::ok(RESEND_SENT_MESSAGE))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::handlers::auth::{
            test_support::{lazy_pool, test_config, test_state, test_state_with},
            FixedWindowLimiter,
        },
        idp::{mock::MockIdentityProvider, ProviderUser},
        mailer::test_support::RecordingMailer,
    };
    use std::time::Duration;

    fn verified_user(email: &str) -> ProviderUser {
        ProviderUser {
            uid: "uid-1".to_string(),
            email: email.to_string(),
            email_verified: true,
            disabled: false,
        }
    }

    #[tokio::test]
    async fn test_verify_email_rejects_empty_token() {
        let fixture = test_state(MockIdentityProvider::new());

        let response = verify_email(
            Extension(fixture.state),
            Extension(lazy_pool()),
            HeaderMap::new(),
            Json(VerifyEmailRequest {
                token: String::new(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_verify_email_storage_error_is_500() {
        let fixture = test_state(MockIdentityProvider::new());

        let response = verify_email(
            Extension(fixture.state),
            Extension(lazy_pool()),
            HeaderMap::new(),
            Json(VerifyEmailRequest {
                token: "t0k".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_resend_rejects_invalid_email() {
        let fixture = test_state(MockIdentityProvider::new());

        let response = resend_verification(
            Extension(fixture.state),
            Extension(lazy_pool()),
            Json(EmailRequest {
                email: "nope".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_resend_unknown_account() {
        let fixture = test_state(MockIdentityProvider::new());

        let response = resend_verification(
            Extension(fixture.state),
            Extension(lazy_pool()),
            Json(EmailRequest {
                email: "ana@example.com".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_resend_already_verified_sends_nothing() {
        let idp = MockIdentityProvider::new().with_user(verified_user("ana@example.com"));
        let fixture = test_state(idp);

        let response = resend_verification(
            Extension(fixture.state),
            Extension(lazy_pool()),
            Json(EmailRequest {
                email: "Ana@Example.com".to_string(),
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(fixture.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_resend_cooldown() {
        let limiter = FixedWindowLimiter::new().with_limit(
            RateLimitAction::ResendVerification,
            1,
            Duration::from_secs(60),
        );
        let fixture = test_state_with(
            MockIdentityProvider::new(),
            RecordingMailer::new(),
            test_config(),
            limiter,
        );

        let first = resend_verification(
            Extension(fixture.state.clone()),
            Extension(lazy_pool()),
            Json(EmailRequest {
                email: "ana@example.com".to_string(),
            }),
        )
        .await;
        assert_eq!(first.status(), StatusCode::NOT_FOUND);

        let second = resend_verification(
            Extension(fixture.state),
            Extension(lazy_pool()),
            Json(EmailRequest {
                email: "ana@example.com".to_string(),
            }),
        )
        .await;
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
