//! Identity provider seam.
//!
//! Credentials, ID tokens, and session cookies are owned by an external
//! identity provider. Everything the rest of the service needs from it goes
//! through the [`IdentityProvider`] trait.

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

pub mod http;

#[cfg(test)]
pub(crate) mod mock;

/// Errors surfaced by credential and token operations.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("email already registered")]
    EmailInUse,

    #[error("password does not meet strength requirements")]
    WeakPassword,

    #[error("credential rejected")]
    InvalidCredential,

    #[error("too many attempts")]
    TooManyRequests,

    #[error("account disabled")]
    UserDisabled,

    #[error("provider request failed: {0}")]
    Network(String),
}

/// Account record as known to the provider.
#[derive(Debug, Clone)]
pub struct ProviderUser {
    pub uid: String,
    pub email: String,
    pub email_verified: bool,
    pub disabled: bool,
}

/// Verified contents of a provider-issued ID token.
#[derive(Debug, Clone)]
pub struct DecodedIdToken {
    pub uid: String,
    pub email: String,
    pub email_verified: bool,
    pub provider: String,
    pub name: Option<String>,
}

/// Verified contents of a provider-signed session cookie.
#[derive(Debug, Clone)]
pub struct SessionClaims {
    pub uid: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a password account, returning the new uid.
    async fn create_user(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<String, CredentialError>;

    /// Look up an account by email. `Ok(None)` when no account exists.
    async fn get_user_by_email(&self, email: &str)
        -> Result<Option<ProviderUser>, CredentialError>;

    /// Verify a provider-issued ID token and return its claims.
    async fn verify_id_token(&self, id_token: &str) -> Result<DecodedIdToken, CredentialError>;

    /// Exchange a fresh ID token for a signed session cookie.
    async fn create_session_cookie(
        &self,
        id_token: &str,
        ttl_seconds: i64,
    ) -> Result<String, CredentialError>;

    /// Validate a session cookie. `None` means unauthenticated, whatever the
    /// reason (expired, revoked, malformed, forged).
    async fn verify_session_cookie(&self, cookie: &str) -> Option<SessionClaims>;

    /// Flip the provider-side email-verified flag for an account.
    async fn set_email_verified(&self, uid: &str) -> Result<(), CredentialError>;

    /// Set a new password for an account.
    async fn update_password(
        &self,
        uid: &str,
        new_password: &SecretString,
    ) -> Result<(), CredentialError>;

    /// Revoke all refresh tokens and sessions for an account.
    async fn revoke_sessions(&self, uid: &str) -> Result<(), CredentialError>;
}
