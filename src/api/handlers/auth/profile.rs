//! Local user-profile store, reconciled against the identity provider.

use crate::idp::DecodedIdToken;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, info_span, instrument, Instrument};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub provider: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReconcileWrite {
    Created,
    Updated,
    Unchanged,
}

/// The verified flag a profile should carry. Federated providers vouch for
/// the address themselves, only password accounts go through our links.
#[must_use]
pub fn desired_verified_flag(provider: &str, token_flag: bool) -> bool {
    if provider == "email" {
        token_flag
    } else {
        true
    }
}

/// Insert a profile unless one already exists for the uid.
///
/// # Errors
/// Returns the underlying database error.
#[instrument(skip(pool))]
pub async fn create_profile(
    pool: &PgPool,
    uid: &str,
    name: &str,
    email: &str,
    provider: &str,
    email_verified: bool,
) -> Result<ProvisionOutcome, sqlx::Error> {
    let span = info_span!("db.query", query = "insert_user_profile");
    let result = sqlx::query(
        "INSERT INTO user_profiles (uid, name, email, provider, email_verified) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (uid) DO NOTHING",
    )
    .bind(uid)
    .bind(name)
    .bind(email)
    .bind(provider)
    .bind(email_verified)
    .execute(pool)
    .instrument(span)
    .await?;

    if result.rows_affected() == 1 {
        Ok(ProvisionOutcome::Created)
    } else {
        Ok(ProvisionOutcome::AlreadyExists)
    }
}

/// # Errors
/// Returns the underlying database error.
pub async fn fetch_profile(pool: &PgPool, uid: &str) -> Result<Option<UserProfile>, sqlx::Error> {
    let span = info_span!("db.query", query = "fetch_user_profile");
    sqlx::query_as::<_, UserProfile>(
        "SELECT uid, name, email, provider, email_verified, created_at \
         FROM user_profiles WHERE uid = $1",
    )
    .bind(uid)
    .fetch_optional(pool)
    .instrument(span)
    .await
}

/// Bring the local profile in line with a freshly verified ID token. Missing
/// profiles are created, a stale verified flag on a password account is
/// updated, everything else is left alone.
///
/// # Errors
/// Returns the underlying database error.
#[instrument(skip_all, fields(uid = %decoded.uid))]
pub async fn reconcile_on_sign_in(
    pool: &PgPool,
    decoded: &DecodedIdToken,
) -> Result<ReconcileWrite, sqlx::Error> {
    let existing = fetch_profile(pool, &decoded.uid).await?;

    let Some(profile) = existing else {
        let name = decoded.name.as_deref().unwrap_or(&decoded.email);
        let verified = desired_verified_flag(&decoded.provider, decoded.email_verified);

        create_profile(
            pool,
            &decoded.uid,
            name,
            &decoded.email,
            &decoded.provider,
            verified,
        )
        .await?;

        info!(uid = %decoded.uid, "profile created on sign-in");
        return Ok(ReconcileWrite::Created);
    };

    if profile.provider == "email" && profile.email_verified != decoded.email_verified {
        let span = info_span!("db.query", query = "update_user_profile_verified");
        sqlx::query(
            "UPDATE user_profiles SET email_verified = $2, updated_at = NOW() WHERE uid = $1",
        )
        .bind(&decoded.uid)
        .bind(decoded.email_verified)
        .execute(pool)
        .instrument(span)
        .await?;

        return Ok(ReconcileWrite::Updated);
    }

    Ok(ReconcileWrite::Unchanged)
}

/// Flip the local verified flag after a token redemption. Idempotent.
///
/// # Errors
/// Returns the underlying database error.
pub async fn mark_email_verified(pool: &PgPool, email: &str) -> Result<u64, sqlx::Error> {
    let span = info_span!("db.query", query = "mark_email_verified");
    let result = sqlx::query(
        "UPDATE user_profiles SET email_verified = TRUE, updated_at = NOW() \
         WHERE email = $1 AND email_verified = FALSE",
    )
    .bind(email)
    .execute(pool)
    .instrument(span)
    .await?;

    Ok(result.rows_affected())
}
