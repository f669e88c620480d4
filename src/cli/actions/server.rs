use crate::{
    api,
    api::handlers::auth::{AuthConfig, FixedWindowLimiter, RateLimitAction, RateLimiter},
    idp::{http::HttpIdentityProvider, IdentityProvider},
    mailer::{smtp::SmtpMailer, EmailTransport, LogMailer},
};
use anyhow::Result;
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::warn;

#[derive(Debug)]
pub struct SmtpArgs {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from: String,
}

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub provider_url: String,
    pub provider_api_key: SecretString,
    pub frontend_base_url: String,
    pub cleanup_secret: SecretString,
    pub verification_token_ttl: i64,
    pub reset_token_ttl: i64,
    pub session_ttl: i64,
    pub resend_cooldown: i64,
    pub smtp: Option<SmtpArgs>,
}

/// Start the HTTP server.
///
/// # Errors
/// Returns an error when a component fails to initialize or the server
/// cannot bind.
pub async fn execute(args: Args) -> Result<()> {
    let config = AuthConfig::new(args.frontend_base_url, args.cleanup_secret)
        .with_verification_token_ttl(args.verification_token_ttl)
        .with_reset_token_ttl(args.reset_token_ttl)
        .with_session_ttl(args.session_ttl);

    let idp: Arc<dyn IdentityProvider> = Arc::new(HttpIdentityProvider::new(
        args.provider_url,
        args.provider_api_key,
    )?);

    let mailer: Arc<dyn EmailTransport> = match args.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(
            &smtp.host,
            smtp.port,
            smtp.username,
            smtp.password,
            smtp.from,
        )?),
        None => {
            warn!("no SMTP relay configured, emails will be logged");
            Arc::new(LogMailer)
        }
    };

    let rate_limiter: Arc<dyn RateLimiter> = Arc::new(FixedWindowLimiter::new().with_limit(
        RateLimitAction::ResendVerification,
        1,
        Duration::from_secs(args.resend_cooldown.unsigned_abs()),
    ));

    api::new(args.port, &args.dsn, config, idp, mailer, rate_limiter).await
}
