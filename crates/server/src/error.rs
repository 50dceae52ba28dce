//! API error responses.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Error envelope the HTTP surface returns. Core errors map onto it; the
/// ingest path adds its own payload-size and rate-limit variants.
#[derive(Debug)]
pub enum ApiError {
    Core(model::Error),
    PayloadTooLarge { limit: usize, got: usize },
    RateLimited { retry_after_secs: u64 },
}

impl From<model::Error> for ApiError {
    fn from(err: model::Error) -> Self {
        Self::Core(err)
    }
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            Self::Core(model::Error::Validation(_)) => "validation_error",
            Self::Core(model::Error::NotFound { .. }) => "not_found",
            Self::Core(model::Error::Conflict(_)) => "conflict",
            Self::Core(model::Error::Auth(_)) => "auth_error",
            Self::Core(model::Error::Upstream { .. }) => "upstream_error",
            Self::Core(model::Error::Parse(_)) => "parse_error",
            Self::Core(model::Error::Internal(_)) => "internal_error",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::RateLimited { .. } => "rate_limited",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Core(model::Error::Validation(_)) => StatusCode::BAD_REQUEST,
            Self::Core(model::Error::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Core(model::Error::Conflict(_)) => StatusCode::CONFLICT,
            Self::Core(model::Error::Auth(_)) => StatusCode::UNAUTHORIZED,
            Self::Core(model::Error::Upstream { .. }) => StatusCode::BAD_GATEWAY,
            Self::Core(model::Error::Parse(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Core(model::Error::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Core(e) => e.to_string(),
            Self::PayloadTooLarge { limit, got } => {
                format!("batch of {got} records exceeds the limit of {limit}")
            }
            Self::RateLimited { retry_after_secs } => {
                format!("rate limited, retry after {retry_after_secs}s")
            }
        };
        if status.is_server_error() {
            error!(status = %status, message, "request failed");
        }

        let body = Json(json!({ "error": { "code": self.code(), "message": message } }));
        let mut response = (status, body).into_response();
        if let Self::RateLimited { retry_after_secs } = self {
            if let Ok(value) = retry_after_secs.to_string().parse() {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::Core(model::Error::Validation("x".into())), StatusCode::BAD_REQUEST),
            (
                ApiError::Core(model::Error::not_found("cluster", "c1")),
                StatusCode::NOT_FOUND,
            ),
            (ApiError::Core(model::Error::Conflict("x".into())), StatusCode::CONFLICT),
            (ApiError::Core(model::Error::Auth("x".into())), StatusCode::UNAUTHORIZED),
            (
                ApiError::Core(model::Error::upstream("llm", "down")),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApiError::PayloadTooLarge { limit: 10, got: 20 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                ApiError::RateLimited { retry_after_secs: 5 },
                StatusCode::TOO_MANY_REQUESTS,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status(), expected);
        }
    }

    #[test]
    fn test_retry_after_header() {
        let response = ApiError::RateLimited { retry_after_secs: 7 }.into_response();
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "7");
    }
}
