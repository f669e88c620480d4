//! HTTP server assembly.

use crate::{
    api::handlers::auth::{AuthConfig, AuthState, RateLimiter},
    cli::telemetry,
    idp::IdentityProvider,
    mailer::EmailTransport,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::Request,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer, request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
pub mod openapi;

pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH_SHORT {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = %request.uri().path(),
        request_id,
    )
}

/// Scheme + host + port of the frontend URL, for the CORS allowlist.
fn frontend_origin(frontend_base_url: &str) -> Result<String> {
    let parsed = url::Url::parse(frontend_base_url).context("invalid frontend base URL")?;
    Ok(parsed.origin().ascii_serialization())
}

/// Bind and serve until interrupted.
///
/// # Errors
/// Returns an error when the pool, router, or listener fail to set up.
pub async fn new(
    port: u16,
    dsn: &str,
    config: AuthConfig,
    idp: Arc<dyn IdentityProvider>,
    mailer: Arc<dyn EmailTransport>,
    rate_limiter: Arc<dyn RateLimiter>,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(120))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("failed to connect to the database")?;

    let origin = frontend_origin(config.frontend_base_url())?
        .parse::<HeaderValue>()
        .context("frontend origin is not a valid header value")?;

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(origin)
        .allow_credentials(true);

    let state = Arc::new(AuthState::new(config, idp, mailer, rate_limiter));

    let router = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health::health))
        .route("/v1/auth/signup", post(handlers::auth::signup::signup))
        .route("/v1/auth/signin", post(handlers::auth::signin::signin))
        .route("/v1/auth/logout", post(handlers::auth::session::logout))
        .route("/v1/auth/session", get(handlers::auth::session::session))
        .route(
            "/v1/auth/resend-verification",
            post(handlers::auth::verification::resend_verification),
        )
        .route(
            "/v1/auth/verify-email",
            post(handlers::auth::verification::verify_email),
        )
        .route(
            "/v1/auth/forgot-password",
            post(handlers::auth::password_reset::forgot_password),
        )
        .route(
            "/v1/auth/reset-password",
            post(handlers::auth::password_reset::reset_password),
        )
        .route(
            "/v1/auth/cleanup-tokens",
            post(handlers::auth::cleanup::cleanup_tokens),
        )
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    X_REQUEST_ID,
                    |_: &Request<Body>| HeaderValue::from_str(&Ulid::new().to_string()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state))
                .layer(Extension(pool)),
        );

    let listener = tokio::net::TcpListener::bind(format!("[::]:{port}"))
        .await
        .context("failed to bind listener")?;

    info!(port, commit = GIT_COMMIT_HASH, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    telemetry::shutdown_tracer();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install shutdown signal handler: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontend_origin_strips_path() {
        let origin = frontend_origin("https://app.example.com/some/path").unwrap();
        assert_eq!(origin, "https://app.example.com");
    }

    #[test]
    fn test_frontend_origin_keeps_port() {
        let origin = frontend_origin("http://localhost:3000").unwrap();
        assert_eq!(origin, "http://localhost:3000");
    }

    #[test]
    fn test_frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }

    #[test]
    fn test_app_user_agent() {
        assert!(APP_USER_AGENT.starts_with("janua/"));
    }
}
