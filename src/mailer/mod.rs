//! Outbound email.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

pub mod smtp;

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()>;
}

/// Logs emails instead of sending them. Used when no SMTP relay is
/// configured and in tests.
pub struct LogMailer;

#[async_trait]
impl EmailTransport for LogMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        info!(to, subject, body_bytes = html.len(), "email (log only)");
        Ok(())
    }
}

/// Subject and HTML body for a verification email.
#[must_use]
pub fn verification_email(verify_url: &str) -> (String, String) {
    let subject = "Verify your email address".to_string();
    let html = format!(
        r#"<div style="font-family: sans-serif; max-width: 600px; margin: 0 auto;">
  <h2>Verify your email address</h2>
  <p>Thanks for signing up. Click the button below to verify your email address.</p>
  <p style="margin: 24px 0;">
    <a href="{verify_url}" style="background: #4f46e5; color: #fff; padding: 12px 24px; border-radius: 6px; text-decoration: none;">Verify email</a>
  </p>
  <p>Or copy this link into your browser:</p>
  <p><a href="{verify_url}">{verify_url}</a></p>
  <p style="color: #6b7280; font-size: 14px;">This link expires in 24 hours. If you did not create an account, you can ignore this email.</p>
</div>"#
    );

    (subject, html)
}

/// Subject and HTML body for a password reset email.
#[must_use]
pub fn password_reset_email(reset_url: &str) -> (String, String) {
    let subject = "Reset your password".to_string();
    let html = format!(
        r#"<div style="font-family: sans-serif; max-width: 600px; margin: 0 auto;">
  <h2>Reset your password</h2>
  <p>We received a request to reset your password. Click the button below to choose a new one.</p>
  <p style="margin: 24px 0;">
    <a href="{reset_url}" style="background: #4f46e5; color: #fff; padding: 12px 24px; border-radius: 6px; text-decoration: none;">Reset password</a>
  </p>
  <p>Or copy this link into your browser:</p>
  <p><a href="{reset_url}">{reset_url}</a></p>
  <p style="color: #6b7280; font-size: 14px;">This link expires in 1 hour. If you did not request a reset, you can ignore this email and your password will stay the same.</p>
</div>"#
    );

    (subject, html)
}
