//! Account creation.
//!
//! Three ways in: email/password (provider account is created here), a
//! federated ID token, or an account already provisioned at the provider.
//! Password accounts start unverified and get a verification link. New
//! unverified accounts have their provider sessions revoked so the client
//! cannot stay signed in before verifying.

use crate::{
    api::handlers::auth::{
        profile::{self, ProvisionOutcome},
        state::AuthState,
        tokens::{self, TokenPurpose},
        types::{AuthResponse, SignUpRequest},
        utils,
    },
    idp::CredentialError,
    mailer,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use secrecy::SecretString;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

pub const SIGNUP_VERIFY_MESSAGE: &str =
    "Account created successfully. Please verify your email before signing in.";
pub const SIGNUP_COMPLETE_MESSAGE: &str = "Account created successfully.";
pub const ALREADY_REGISTERED_MESSAGE: &str =
    "This email address is already registered. Please sign in instead.";

/// User-facing message for a credential failure.
#[must_use]
pub fn credential_error_message(err: &CredentialError) -> &'static str {
    match err {
        CredentialError::EmailInUse => ALREADY_REGISTERED_MESSAGE,
        CredentialError::WeakPassword => {
            "Your password is too weak. Please use at least 8 characters \
             with a mix of letters and numbers."
        }
        CredentialError::InvalidCredential => "Invalid credentials. Please try again.",
        CredentialError::TooManyRequests => "Too many attempts. Please try again later.",
        CredentialError::UserDisabled => "This account has been disabled.",
        CredentialError::Network(_) => "Something went wrong. Please try again later.",
    }
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(AuthResponse::err(message))).into_response()
}

fn storage_failure() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(AuthResponse::err(
            "Failed to create your account. Please try again.",
        )),
    )
        .into_response()
}

/// Create an account.
#[utoipa::path(
    post,
    path = "/v1/auth/signup",
    tag = "auth",
    request_body = SignUpRequest,
    responses(
        (status = 200, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid request or credentials", body = AuthResponse),
        (status = 409, description = "Account already exists", body = AuthResponse),
        (status = 500, description = "Storage error", body = AuthResponse),
    )
)]
#[instrument(skip_all)]
pub async fn signup(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    Json(request): Json<SignUpRequest>,
) -> Response {
    let email = utils::normalize_email(&request.email);
    if !utils::valid_email(&email) {
        return bad_request("Please enter a valid email address.");
    }

    let name = request.name.trim();
    if name.is_empty() {
        return bad_request("Please enter your name.");
    }

    if let Some(password) = &request.password {
        return password_signup(&state, &pool, &email, name, password).await;
    }

    if let Some(id_token) = &request.id_token {
        return federated_signup(&state, &pool, &email, name, id_token).await;
    }

    if let Some(uid) = &request.uid {
        return preprovisioned_signup(&state, &pool, &email, name, uid, &request).await;
    }

    bad_request("A password, ID token, or provider uid is required.")
}

async fn password_signup(
    state: &AuthState,
    pool: &PgPool,
    email: &str,
    name: &str,
    password: &str,
) -> Response {
    let password = SecretString::from(password.to_string());

    let uid = match state.idp().create_user(email, &password).await {
        Ok(uid) => uid,
        Err(err) => {
            info!(email, "signup rejected by provider: {err}");
            return bad_request(credential_error_message(&err));
        }
    };

    // The provider may have handed the client a live session on account
    // creation. The account is unverified, kill it.
    if let Err(err) = state.idp().revoke_sessions(&uid).await {
        warn!(uid, "failed to revoke sessions after signup: {err}");
    }

    match profile::create_profile(pool, &uid, name, email, "email", false).await {
        Ok(ProvisionOutcome::Created) => {}
        Ok(ProvisionOutcome::AlreadyExists) => {
            return (
                StatusCode::CONFLICT,
                Json(AuthResponse::err(ALREADY_REGISTERED_MESSAGE)),
            )
                .into_response();
        }
        Err(err) => {
            error!(uid, "failed to store profile: {err}");
            // Leave no half-created account signed in
            if let Err(err) = state.idp().revoke_sessions(&uid).await {
                warn!(uid, "failed to revoke sessions after storage error: {err}");
            }
            return storage_failure();
        }
    }

    send_verification_email(state, pool, email).await;

    (StatusCode::OK, Json(AuthResponse::ok(SIGNUP_VERIFY_MESSAGE))).into_response()
}

async fn federated_signup(
    state: &AuthState,
    pool: &PgPool,
    email: &str,
    name: &str,
    id_token: &str,
) -> Response {
    let decoded = match state.idp().verify_id_token(id_token).await {
        Ok(decoded) => decoded,
        Err(err) => {
            info!(email, "federated signup token rejected: {err}");
            return (
                StatusCode::UNAUTHORIZED,
                Json(AuthResponse::err(credential_error_message(&err))),
            )
                .into_response();
        }
    };

    if decoded.email != email {
        warn!(
            uid = decoded.uid,
            "signup email does not match token, using token email"
        );
    }

    let name = decoded.name.as_deref().unwrap_or(name);

    match profile::create_profile(pool, &decoded.uid, name, &decoded.email, &decoded.provider, true)
        .await
    {
        Ok(ProvisionOutcome::Created) => {
            (StatusCode::OK, Json(AuthResponse::ok(SIGNUP_COMPLETE_MESSAGE))).into_response()
        }
        Ok(ProvisionOutcome::AlreadyExists) => (
            StatusCode::CONFLICT,
            Json(AuthResponse::err(ALREADY_REGISTERED_MESSAGE)),
        )
            .into_response(),
        Err(err) => {
            error!(uid = decoded.uid, "failed to store profile: {err}");
            storage_failure()
        }
    }
}

async fn preprovisioned_signup(
    state: &AuthState,
    pool: &PgPool,
    email: &str,
    name: &str,
    uid: &str,
    request: &SignUpRequest,
) -> Response {
    let provider = request.provider.as_deref().unwrap_or("email");
    let verified =
        profile::desired_verified_flag(provider, request.email_verified.unwrap_or(false));

    if !verified {
        if let Err(err) = state.idp().revoke_sessions(uid).await {
            warn!(uid, "failed to revoke sessions after signup: {err}");
        }
    }

    match profile::create_profile(pool, uid, name, email, provider, verified).await {
        Ok(ProvisionOutcome::Created) => {}
        Ok(ProvisionOutcome::AlreadyExists) => {
            return (
                StatusCode::CONFLICT,
                Json(AuthResponse::err(ALREADY_REGISTERED_MESSAGE)),
            )
                .into_response();
        }
        Err(err) => {
            error!(uid, "failed to store profile: {err}");
            return storage_failure();
        }
    }

    if verified {
        (StatusCode::OK, Json(AuthResponse::ok(SIGNUP_COMPLETE_MESSAGE))).into_response()
    } else {
        send_verification_email(state, pool, email).await;
        (StatusCode::OK, Json(AuthResponse::ok(SIGNUP_VERIFY_MESSAGE))).into_response()
    }
}

/// Issue a verification token and mail the link. Failures are logged, the
/// account exists either way and the user can ask for a resend.
pub(crate) async fn send_verification_email(state: &AuthState, pool: &PgPool, email: &str) {
    let token = match tokens::issue_token(
        pool,
        email,
        TokenPurpose::VerifyEmail,
        state.config().verification_token_ttl(),
    )
    .await
    {
        Ok(token) => token,
        Err(err) => {
            error!(email, "failed to issue verification token: {err}");
            return;
        }
    };

    let url = utils::build_verify_url(state.config().frontend_base_url(), &token);
    let (subject, html) = mailer::verification_email(&url);

    if let Err(err) = state.mailer().send(email, &subject, &html).await {
        error!(email, "failed to send verification email: {err}");
    }
}
