//! Expired-token cleanup, meant to be hit by a scheduler.

use crate::api::handlers::auth::{
    state::AuthState,
    tokens,
    types::{AuthResponse, CleanupResponse},
};
use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, instrument};

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Delete expired tokens.
#[utoipa::path(
    post,
    path = "/v1/auth/cleanup-tokens",
    tag = "auth",
    responses(
        (status = 200, description = "Expired tokens removed", body = CleanupResponse),
        (status = 401, description = "Missing bearer token", body = AuthResponse),
        (status = 403, description = "Wrong bearer token", body = AuthResponse),
        (status = 500, description = "Storage error", body = AuthResponse),
    )
)]
#[instrument(skip_all)]
pub async fn cleanup_tokens(
    Extension(state): Extension<Arc<AuthState>>,
    Extension(pool): Extension<PgPool>,
    headers: HeaderMap,
) -> Response {
    let Some(secret) = bearer_token(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(AuthResponse::err("Authentication required")),
        )
            .into_response();
    };

    if !state.config().cleanup_secret_matches(secret) {
        return (
            StatusCode::FORBIDDEN,
            Json(AuthResponse::err("Invalid authorization")),
        )
            .into_response();
    }

    match tokens::purge_expired(&pool).await {
        Ok(count) => {
            info!(count, "expired tokens removed");
            (
                StatusCode::OK,
                Json(CleanupResponse {
                    success: true,
                    message: format!("Successfully cleaned up {count} expired tokens."),
                    count,
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!("failed to purge expired tokens: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AuthResponse::err("Cleanup failed. Please try again later.")),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::handlers::auth::test_support::{lazy_pool, test_state},
        idp::mock::MockIdentityProvider,
    };
    use axum::http::HeaderValue;

    fn headers_with_auth(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(
            bearer_token(&headers_with_auth("Bearer hush")),
            Some("hush")
        );
        assert_eq!(bearer_token(&headers_with_auth("Basic hush")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_cleanup_requires_auth() {
        let fixture = test_state(MockIdentityProvider::new());

        let response = cleanup_tokens(
            Extension(fixture.state),
            Extension(lazy_pool()),
            HeaderMap::new(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_cleanup_rejects_wrong_secret() {
        let fixture = test_state(MockIdentityProvider::new());

        let response = cleanup_tokens(
            Extension(fixture.state),
            Extension(lazy_pool()),
            headers_with_auth("Bearer wrong"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_cleanup_storage_error_is_500() {
        let fixture = test_state(MockIdentityProvider::new());

        let response = cleanup_tokens(
            Extension(fixture.state),
            Extension(lazy_pool()),
            headers_with_auth("Bearer hush"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
