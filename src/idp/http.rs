//! REST client for the identity provider.

use crate::{
    api::APP_USER_AGENT,
    idp::{CredentialError, DecodedIdToken, IdentityProvider, ProviderUser, SessionClaims},
};
use anyhow::Result;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument};

pub struct HttpIdentityProvider {
    base_url: String,
    api_key: SecretString,
    client: reqwest::Client,
}

impl HttpIdentityProvider {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: String, api_key: SecretString) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    #[instrument(skip(self, body))]
    async fn post(&self, path: &str, body: Value) -> Result<Value, CredentialError> {
        let url = format!("{}/{path}", self.base_url);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&body)
            .send()
            .await
            .map_err(|err| CredentialError::Network(err.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|err| CredentialError::Network(err.to_string()))?;

        if status.is_success() {
            return Ok(payload);
        }

        let code = error_code(&payload);
        debug!(%status, code, "provider request rejected");
        Err(map_error_code(code))
    }
}

/// Extract the provider error code from an error payload.
fn error_code(payload: &Value) -> &str {
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("")
}

fn map_error_code(code: &str) -> CredentialError {
    // Codes may carry a trailing reason, e.g. "TOO_MANY_ATTEMPTS_TRY_LATER : ..."
    let code = code.split_whitespace().next().unwrap_or("");

    match code {
        "EMAIL_EXISTS" => CredentialError::EmailInUse,
        "WEAK_PASSWORD" => CredentialError::WeakPassword,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => CredentialError::TooManyRequests,
        "USER_DISABLED" => CredentialError::UserDisabled,
        "INVALID_ID_TOKEN" | "INVALID_SESSION_COOKIE" | "INVALID_LOGIN_CREDENTIALS"
        | "EMAIL_NOT_FOUND" => CredentialError::InvalidCredential,
        other => CredentialError::Network(format!("unexpected provider error: {other}")),
    }
}

fn parse_user(user: &Value) -> Option<ProviderUser> {
    Some(ProviderUser {
        uid: user.get("localId")?.as_str()?.to_string(),
        email: user.get("email")?.as_str()?.to_string(),
        email_verified: user
            .get("emailVerified")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        disabled: user
            .get("disabled")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn parse_decoded_token(payload: &Value) -> Option<DecodedIdToken> {
    Some(DecodedIdToken {
        uid: payload.get("localId")?.as_str()?.to_string(),
        email: payload.get("email")?.as_str()?.to_string(),
        email_verified: payload
            .get("emailVerified")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        provider: payload
            .get("signInProvider")
            .and_then(Value::as_str)
            .unwrap_or("email")
            .to_string(),
        name: payload
            .get("displayName")
            .and_then(Value::as_str)
            .map(ToString::to_string),
    })
}

fn parse_session_claims(payload: &Value) -> Option<SessionClaims> {
    Some(SessionClaims {
        uid: payload.get("localId")?.as_str()?.to_string(),
        email: payload
            .get("email")
            .and_then(Value::as_str)
            .map(ToString::to_string),
    })
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn create_user(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<String, CredentialError> {
        let payload = self
            .post(
                "v1/accounts:signUp",
                json!({
                    "email": email,
                    "password": password.expose_secret(),
                    "returnSecureToken": false,
                }),
            )
            .await?;

        payload
            .get("localId")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| CredentialError::Network("signUp response missing localId".to_string()))
    }

    async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<ProviderUser>, CredentialError> {
        let result = self
            .post("v1/accounts:lookup", json!({ "email": [email] }))
            .await;

        match result {
            Ok(payload) => Ok(payload
                .pointer("/users/0")
                .and_then(parse_user)),
            Err(CredentialError::InvalidCredential) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<DecodedIdToken, CredentialError> {
        let payload = self
            .post("v1/tokens:verify", json!({ "idToken": id_token }))
            .await?;

        parse_decoded_token(&payload).ok_or(CredentialError::InvalidCredential)
    }

    async fn create_session_cookie(
        &self,
        id_token: &str,
        ttl_seconds: i64,
    ) -> Result<String, CredentialError> {
        let payload = self
            .post(
                "v1/sessions:create",
                json!({ "idToken": id_token, "validDuration": ttl_seconds }),
            )
            .await?;

        payload
            .get("sessionCookie")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| {
                CredentialError::Network("sessions:create response missing cookie".to_string())
            })
    }

    async fn verify_session_cookie(&self, cookie: &str) -> Option<SessionClaims> {
        let payload = self
            .post("v1/sessions:verify", json!({ "sessionCookie": cookie }))
            .await
            .ok()?;

        parse_session_claims(&payload)
    }

    async fn set_email_verified(&self, uid: &str) -> Result<(), CredentialError> {
        self.post(
            "v1/accounts:update",
            json!({ "localId": uid, "emailVerified": true }),
        )
        .await?;

        Ok(())
    }

    async fn update_password(
        &self,
        uid: &str,
        new_password: &SecretString,
    ) -> Result<(), CredentialError> {
        self.post(
            "v1/accounts:update",
            json!({ "localId": uid, "password": new_password.expose_secret() }),
        )
        .await?;

        Ok(())
    }

    async fn revoke_sessions(&self, uid: &str) -> Result<(), CredentialError> {
        self.post("v1/accounts:revokeSessions", json!({ "localId": uid }))
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let payload = json!({ "error": { "message": "EMAIL_EXISTS", "code": 400 } });
        assert_eq!(error_code(&payload), "EMAIL_EXISTS");

        let empty = json!({});
        assert_eq!(error_code(&empty), "");
    }

    #[test]
    fn test_map_error_code() {
        assert!(matches!(
            map_error_code("EMAIL_EXISTS"),
            CredentialError::EmailInUse
        ));
        assert!(matches!(
            map_error_code("WEAK_PASSWORD : Password should be at least 6 characters"),
            CredentialError::WeakPassword
        ));
        assert!(matches!(
            map_error_code("TOO_MANY_ATTEMPTS_TRY_LATER"),
            CredentialError::TooManyRequests
        ));
        assert!(matches!(
            map_error_code("USER_DISABLED"),
            CredentialError::UserDisabled
        ));
        assert!(matches!(
            map_error_code("INVALID_SESSION_COOKIE"),
            CredentialError::InvalidCredential
        ));
        assert!(matches!(
            map_error_code("SOMETHING_ELSE"),
            CredentialError::Network(_)
        ));
    }

    #[test]
    fn test_parse_user() {
        let payload = json!({
            "localId": "uid-1",
            "email": "ana@example.com",
            "emailVerified": true,
        });

        let user = parse_user(&payload).unwrap();
        assert_eq!(user.uid, "uid-1");
        assert_eq!(user.email, "ana@example.com");
        assert!(user.email_verified);
        assert!(!user.disabled);
    }

    #[test]
    fn test_parse_user_missing_fields() {
        assert!(parse_user(&json!({ "email": "ana@example.com" })).is_none());
    }

    #[test]
    fn test_parse_decoded_token_defaults_provider() {
        let payload = json!({ "localId": "uid-1", "email": "ana@example.com" });

        let decoded = parse_decoded_token(&payload).unwrap();
        assert_eq!(decoded.provider, "email");
        assert!(!decoded.email_verified);
        assert_eq!(decoded.name, None);
    }

    #[test]
    fn test_parse_decoded_token_federated() {
        let payload = json!({
            "localId": "uid-2",
            "email": "bo@example.com",
            "emailVerified": true,
            "signInProvider": "google.com",
            "displayName": "Bo",
        });

        let decoded = parse_decoded_token(&payload).unwrap();
        assert_eq!(decoded.provider, "google.com");
        assert!(decoded.email_verified);
        assert_eq!(decoded.name.as_deref(), Some("Bo"));
    }

    #[test]
    fn test_parse_session_claims() {
        let payload = json!({ "localId": "uid-1" });
        let claims = parse_session_claims(&payload).unwrap();
        assert_eq!(claims.uid, "uid-1");
        assert_eq!(claims.email, None);
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let provider = HttpIdentityProvider::new(
            "https://idp.example.com/".to_string(),
            SecretString::from("key"),
        )
        .unwrap();
        assert_eq!(provider.base_url, "https://idp.example.com");
    }
}
