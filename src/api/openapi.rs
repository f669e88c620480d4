use crate::api::handlers::{self, auth, health};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "janua",
        description = "Authentication and session lifecycle service",
    ),
    paths(
        handlers::root,
        health::health,
        auth::signup::signup,
        auth::signin::signin,
        auth::session::session,
        auth::session::logout,
        auth::verification::verify_email,
        auth::verification::resend_verification,
        auth::password_reset::forgot_password,
        auth::password_reset::reset_password,
        auth::cleanup::cleanup_tokens,
    ),
    components(schemas(
        health::HealthResponse,
        auth::types::SignUpRequest,
        auth::types::SignInRequest,
        auth::types::EmailRequest,
        auth::types::VerifyEmailRequest,
        auth::types::ResetPasswordRequest,
        auth::types::AuthResponse,
        auth::types::SessionResponse,
        auth::types::CleanupResponse,
    )),
    tags(
        (name = "auth", description = "Accounts, tokens, and sessions"),
        (name = "meta", description = "Service metadata"),
    )
)]
pub struct ApiDoc;
