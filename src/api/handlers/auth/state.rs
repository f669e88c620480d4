//! Shared configuration and state for the auth endpoints.

use crate::{idp::IdentityProvider, mailer::EmailTransport};
use crate::api::handlers::auth::rate_limit::RateLimiter;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

const DEFAULT_VERIFICATION_TOKEN_TTL: i64 = 86_400;
const DEFAULT_RESET_TOKEN_TTL: i64 = 3_600;
const DEFAULT_SESSION_TTL: i64 = 604_800;

#[derive(Clone)]
pub struct AuthConfig {
    frontend_base_url: String,
    cleanup_secret: SecretString,
    verification_token_ttl: i64,
    reset_token_ttl: i64,
    session_ttl: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String, cleanup_secret: SecretString) -> Self {
        Self {
            frontend_base_url: frontend_base_url.trim_end_matches('/').to_string(),
            cleanup_secret,
            verification_token_ttl: DEFAULT_VERIFICATION_TOKEN_TTL,
            reset_token_ttl: DEFAULT_RESET_TOKEN_TTL,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    #[must_use]
    pub fn with_verification_token_ttl(mut self, seconds: i64) -> Self {
        self.verification_token_ttl = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl(mut self, seconds: i64) -> Self {
        self.reset_token_ttl = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, seconds: i64) -> Self {
        self.session_ttl = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub const fn verification_token_ttl(&self) -> i64 {
        self.verification_token_ttl
    }

    #[must_use]
    pub const fn reset_token_ttl(&self) -> i64 {
        self.reset_token_ttl
    }

    #[must_use]
    pub const fn session_ttl(&self) -> i64 {
        self.session_ttl
    }

    /// Session cookies carry `Secure` only when the frontend is served over
    /// https, so local development over http still works.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }

    #[must_use]
    pub fn cleanup_secret_matches(&self, candidate: &str) -> bool {
        self.cleanup_secret.expose_secret() == candidate
    }
}

#[derive(Clone)]
pub struct AuthState {
    config: AuthConfig,
    idp: Arc<dyn IdentityProvider>,
    mailer: Arc<dyn EmailTransport>,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        idp: Arc<dyn IdentityProvider>,
        mailer: Arc<dyn EmailTransport>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            config,
            idp,
            mailer,
            rate_limiter,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn idp(&self) -> &dyn IdentityProvider {
        self.idp.as_ref()
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn EmailTransport {
        self.mailer.as_ref()
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}
