use crate::api::GIT_COMMIT_HASH;
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub name: String,
    pub version: String,
    pub build: String,
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "meta",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
    )
)]
pub async fn health() -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");

    (
        StatusCode::OK,
        [(
            header::HeaderName::from_static("x-app"),
            format!("{}:{version}:{GIT_COMMIT_HASH}", env!("CARGO_PKG_NAME")),
        )],
        Json(HealthResponse {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: version.to_string(),
            build: GIT_COMMIT_HASH.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, response::Response};

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let app_header = response.headers().get("x-app").unwrap().to_str().unwrap();
        assert!(app_header.starts_with("janua:"));

        let body = body_json(response).await;
        assert_eq!(body["name"], "janua");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }
}
