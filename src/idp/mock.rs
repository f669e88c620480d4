//! In-memory provider used by handler tests.

use crate::idp::{
    CredentialError, DecodedIdToken, IdentityProvider, ProviderUser, SessionClaims,
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::Duration,
};

#[derive(Default)]
struct MockState {
    users: HashMap<String, ProviderUser>,
    id_tokens: HashMap<String, DecodedIdToken>,
    revoked: Vec<String>,
    password_updates: Vec<(String, String)>,
    verified: Vec<String>,
    fail_create_user: Option<fn() -> CredentialError>,
    fail_update_password: bool,
    lookup_delay: Option<Duration>,
}

#[derive(Default)]
pub struct MockIdentityProvider {
    state: Mutex<MockState>,
    next_uid: Mutex<u64>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_user(self, user: ProviderUser) -> Self {
        self.lock().users.insert(user.email.clone(), user);
        self
    }

    pub fn with_id_token(self, token: &str, decoded: DecodedIdToken) -> Self {
        self.lock().id_tokens.insert(token.to_string(), decoded);
        self
    }

    pub fn failing_create_user(self, err: fn() -> CredentialError) -> Self {
        self.lock().fail_create_user = Some(err);
        self
    }

    pub fn failing_update_password(self) -> Self {
        self.lock().fail_update_password = true;
        self
    }

    pub fn with_lookup_delay(self, delay: Duration) -> Self {
        self.lock().lookup_delay = Some(delay);
        self
    }

    pub fn revoked_uids(&self) -> Vec<String> {
        self.lock().revoked.clone()
    }

    pub fn password_updates(&self) -> Vec<(String, String)> {
        self.lock().password_updates.clone()
    }

    pub fn verified_uids(&self) -> Vec<String> {
        self.lock().verified.clone()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn create_user(
        &self,
        email: &str,
        _password: &SecretString,
    ) -> Result<String, CredentialError> {
        let mut state = self.lock();

        if let Some(err) = state.fail_create_user {
            return Err(err());
        }

        if state.users.contains_key(email) {
            return Err(CredentialError::EmailInUse);
        }

        let uid = {
            let mut next = self.next_uid.lock().unwrap_or_else(PoisonError::into_inner);
            *next += 1;
            format!("mock-uid-{next}")
        };

        state.users.insert(
            email.to_string(),
            ProviderUser {
                uid: uid.clone(),
                email: email.to_string(),
                email_verified: false,
                disabled: false,
            },
        );

        Ok(uid)
    }

    async fn get_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<ProviderUser>, CredentialError> {
        let delay = self.lock().lookup_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(self.lock().users.get(email).cloned())
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<DecodedIdToken, CredentialError> {
        self.lock()
            .id_tokens
            .get(id_token)
            .cloned()
            .ok_or(CredentialError::InvalidCredential)
    }

    async fn create_session_cookie(
        &self,
        id_token: &str,
        _ttl_seconds: i64,
    ) -> Result<String, CredentialError> {
        let decoded = self.verify_id_token(id_token).await?;
        Ok(format!("session-for-{}", decoded.uid))
    }

    async fn verify_session_cookie(&self, cookie: &str) -> Option<SessionClaims> {
        let uid = cookie.strip_prefix("session-for-")?;
        let state = self.lock();

        if state.revoked.iter().any(|revoked| revoked == uid) {
            return None;
        }

        let email = state
            .users
            .values()
            .find(|user| user.uid == uid)
            .map(|user| user.email.clone());

        Some(SessionClaims {
            uid: uid.to_string(),
            email,
        })
    }

    async fn set_email_verified(&self, uid: &str) -> Result<(), CredentialError> {
        let mut state = self.lock();
        state.verified.push(uid.to_string());

        for user in state.users.values_mut() {
            if user.uid == uid {
                user.email_verified = true;
            }
        }

        Ok(())
    }

    async fn update_password(
        &self,
        uid: &str,
        new_password: &SecretString,
    ) -> Result<(), CredentialError> {
        let mut state = self.lock();

        if state.fail_update_password {
            return Err(CredentialError::WeakPassword);
        }

        state
            .password_updates
            .push((uid.to_string(), new_password.expose_secret().to_string()));

        Ok(())
    }

    async fn revoke_sessions(&self, uid: &str) -> Result<(), CredentialError> {
        self.lock().revoked.push(uid.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_user_rejects_duplicates() {
        let idp = MockIdentityProvider::new();
        let password = SecretString::from("pw");

        let uid = idp.create_user("ana@example.com", &password).await.unwrap();
        assert!(uid.starts_with("mock-uid-"));

        let duplicate = idp.create_user("ana@example.com", &password).await;
        assert!(matches!(duplicate, Err(CredentialError::EmailInUse)));
    }

    #[tokio::test]
    async fn test_revoked_sessions_stop_verifying() {
        let idp = MockIdentityProvider::new();

        let claims = idp.verify_session_cookie("session-for-uid-1").await;
        assert_eq!(claims.unwrap().uid, "uid-1");

        idp.revoke_sessions("uid-1").await.unwrap();
        assert_eq!(idp.revoked_uids(), vec!["uid-1".to_string()]);
        assert!(idp.verify_session_cookie("session-for-uid-1").await.is_none());
    }

    #[tokio::test]
    async fn test_password_updates_are_recorded() {
        let idp = MockIdentityProvider::new();
        let password = SecretString::from("new pw");

        idp.update_password("uid-1", &password).await.unwrap();
        assert_eq!(
            idp.password_updates(),
            vec![("uid-1".to_string(), "new pw".to_string())]
        );

        let failing = MockIdentityProvider::new().failing_update_password();
        let result = failing.update_password("uid-1", &password).await;
        assert!(matches!(result, Err(CredentialError::WeakPassword)));
    }

    #[tokio::test]
    async fn test_set_email_verified_flips_user() {
        let idp = MockIdentityProvider::new().with_user(ProviderUser {
            uid: "uid-1".to_string(),
            email: "ana@example.com".to_string(),
            email_verified: false,
            disabled: false,
        });

        idp.set_email_verified("uid-1").await.unwrap();
        assert_eq!(idp.verified_uids(), vec!["uid-1".to_string()]);

        let user = idp.get_user_by_email("ana@example.com").await.unwrap();
        assert!(user.unwrap().email_verified);
    }
}
