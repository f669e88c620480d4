//! Single-use token storage.
//!
//! Tokens are random 256-bit values handed to the user inside a link. Only
//! the SHA-256 hash is stored. Redemption is a single conditional UPDATE so
//! two concurrent requests with the same token cannot both succeed.

use crate::api::handlers::auth::utils::{generate_token, hash_token, is_unique_violation};
use sqlx::PgPool;
use tracing::{info_span, instrument, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    VerifyEmail,
    ResetPassword,
}

impl TokenPurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VerifyEmail => "verify_email",
            Self::ResetPassword => "reset_password",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RedeemOutcome {
    /// Token was live and is now consumed.
    Redeemed { email: String },
    /// Unknown, already used, or expired. Indistinguishable on purpose.
    NotFound,
}

/// Create a token for `email` and return the plaintext value. Only the hash
/// reaches the database.
///
/// # Errors
/// Returns the underlying database error after exhausting retries.
#[instrument(skip(pool), fields(purpose = purpose.as_str()))]
pub async fn issue_token(
    pool: &PgPool,
    email: &str,
    purpose: TokenPurpose,
    ttl_seconds: i64,
) -> Result<String, sqlx::Error> {
    // A hash collision on insert is a duplicate random token, retry with a
    // fresh one
    let mut last_err = None;

    for _ in 0..3 {
        let token = generate_token();
        let token_hash = hash_token(&token);

        let span = info_span!("db.query", query = "insert_auth_token");
        let result = sqlx::query(
            "INSERT INTO auth_tokens (email, token_hash, purpose, expires_at) \
             VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))",
        )
        .bind(email)
        .bind(&token_hash)
        .bind(purpose.as_str())
        .bind(ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => last_err = Some(err),
            Err(err) => return Err(err),
        }
    }

    Err(last_err.unwrap_or(sqlx::Error::PoolClosed))
}

/// Atomically consume a live token. Returns [`RedeemOutcome::NotFound`] for
/// unknown, expired, and already-consumed tokens alike.
///
/// # Errors
/// Returns the underlying database error.
#[instrument(skip_all, fields(purpose = purpose.as_str()))]
pub async fn redeem_token(
    pool: &PgPool,
    token: &str,
    purpose: TokenPurpose,
) -> Result<RedeemOutcome, sqlx::Error> {
    let token_hash = hash_token(token);

    let span = info_span!("db.query", query = "redeem_auth_token");
    let email: Option<String> = sqlx::query_scalar(
        "UPDATE auth_tokens SET consumed_at = NOW() \
         WHERE token_hash = $1 AND purpose = $2 \
           AND consumed_at IS NULL AND expires_at > NOW() \
         RETURNING email",
    )
    .bind(&token_hash)
    .bind(purpose.as_str())
    .fetch_optional(pool)
    .instrument(span)
    .await?;

    match email {
        Some(email) => Ok(RedeemOutcome::Redeemed { email }),
        None => {
            // Drop the row if it only missed because it expired
            let span = info_span!("db.query", query = "delete_expired_auth_token");
            sqlx::query(
                "DELETE FROM auth_tokens \
                 WHERE token_hash = $1 AND consumed_at IS NULL AND expires_at <= NOW()",
            )
            .bind(&token_hash)
            .execute(pool)
            .instrument(span)
            .await?;

            Ok(RedeemOutcome::NotFound)
        }
    }
}

/// Delete every expired token, consumed or not. Returns the number removed.
///
/// # Errors
/// Returns the underlying database error.
#[instrument(skip_all)]
pub async fn purge_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let span = info_span!("db.query", query = "purge_expired_auth_tokens");
    let result = sqlx::query("DELETE FROM auth_tokens WHERE expires_at < NOW()")
        .execute(pool)
        .instrument(span)
        .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::test_support::lazy_pool;

    #[test]
    fn test_purpose_as_str() {
        assert_eq!(TokenPurpose::VerifyEmail.as_str(), "verify_email");
        assert_eq!(TokenPurpose::ResetPassword.as_str(), "reset_password");
    }

    #[tokio::test]
    async fn test_issue_token_surfaces_pool_errors() {
        let pool = lazy_pool();
        let result = issue_token(&pool, "ana@example.com", TokenPurpose::VerifyEmail, 60).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_redeem_token_surfaces_pool_errors() {
        let pool = lazy_pool();
        let result = redeem_token(&pool, "t0k", TokenPurpose::ResetPassword).await;
        assert!(result.is_err());
    }
}
