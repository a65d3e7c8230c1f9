//! Identity middleware for Axum
//!
//! Requests identify their caller with an `x-user-id` header; the
//! `OwnerId` extractor makes it available to handlers and rejects
//! requests without one. Upstream infrastructure is expected to have
//! authenticated the caller already.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Header carrying the caller identity
pub const USER_ID_HEADER: &str = "x-user-id";

/// JSON error response for identity failures
#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    error: String,
    code: String,
}

/// Rejection for requests without a usable identity header
pub struct AuthRejection;

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(AuthErrorResponse {
                error: format!("Missing or empty {USER_ID_HEADER} header"),
                code: "UNAUTHORIZED".to_string(),
            }),
        )
            .into_response()
    }
}

/// Axum extractor for the caller identity.
pub struct OwnerId(pub String);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let owner = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AuthRejection)?;

        Ok(OwnerId(owner.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<OwnerId, AuthRejection> {
        let (mut parts, ()) = request.into_parts();
        OwnerId::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_extracts_user_id() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "user1")
            .body(())
            .unwrap();
        let OwnerId(owner) = extract(request).await.unwrap_or(OwnerId(String::new()));
        assert_eq!(owner, "user1");
    }

    #[tokio::test]
    async fn test_rejects_missing_header() {
        let request = Request::builder().body(()).unwrap();
        assert!(extract(request).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_blank_header() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "   ")
            .body(())
            .unwrap();
        assert!(extract(request).await.is_err());
    }
}
