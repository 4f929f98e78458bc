use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("retrieval error: {0}")]
    Retrieval(String),
    #[error("authentication error: {0}")]
    Authentication(String),
    #[error("generation error: {0}")]
    Generation(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn configuration<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Configuration(err.to_string())
    }

    /// Whether the error should stop the process before it serves requests.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ApiError::Configuration(_) | ApiError::Authentication(_)
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::Configuration(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::Fetch(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::Retrieval(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::Authentication(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::Generation(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_and_auth_errors_are_fatal() {
        assert!(ApiError::Configuration("missing key".into()).is_fatal());
        assert!(ApiError::Authentication("401".into()).is_fatal());
        assert!(!ApiError::Retrieval("index query failed".into()).is_fatal());
        assert!(!ApiError::Generation("stream reset".into()).is_fatal());
    }

    #[test]
    fn maps_variants_to_status_codes() {
        let resp = ApiError::Configuration("no index".into()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = ApiError::BadRequest("empty".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = ApiError::internal("boom").into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
