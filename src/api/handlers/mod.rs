use axum::http::StatusCode;

pub mod auth;
pub mod health;

/// Root banner.
#[utoipa::path(
    get,
    path = "/",
    tag = "meta",
    responses(
        (status = 200, description = "Service banner", body = String),
    )
)]
pub async fn root() -> (StatusCode, String) {
    (
        StatusCode::OK,
        format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
    )
}
