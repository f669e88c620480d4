//! SMTP transport backed by lettre.

use crate::mailer::EmailTransport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::debug;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    /// Build a STARTTLS relay transport. No retries, a failed send is
    /// reported to the caller.
    ///
    /// # Errors
    /// Returns an error when the relay host is invalid or the from address
    /// does not parse.
    pub fn new(
        host: &str,
        port: u16,
        username: Option<String>,
        password: Option<SecretString>,
        from: String,
    ) -> Result<Self> {
        // Reject a bad from address at startup rather than on first send
        from.parse::<lettre::message::Mailbox>()
            .context("invalid from address")?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .port(port)
            .timeout(Some(Duration::from_secs(10)));

        if let Some(username) = username {
            let password = password
                .map(|p| p.expose_secret().to_string())
                .unwrap_or_default();
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailTransport for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())?;

        let response = self.transport.send(message).await?;
        debug!(to, code = %response.code(), "email sent");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_from() {
        let result = SmtpMailer::new(
            "mail.example.com",
            587,
            None,
            None,
            "not an address".to_string(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_new_with_credentials() {
        let result = SmtpMailer::new(
            "mail.example.com",
            587,
            Some("mailer".to_string()),
            Some(SecretString::from("pw")),
            "noreply@example.com".to_string(),
        );
        assert!(result.is_ok());
    }
}
