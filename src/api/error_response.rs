//! HTTP error response handling for the API
//!
//! Converts domain errors to HTTP responses with the appropriate status
//! code and a JSON error body.

use crate::error::{ApiError, Error};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Convert errors to HTTP responses automatically when a handler returns Err
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let api_error: ApiError = self.into();

        (status_code, Json(api_error)).into_response()
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn busy_becomes_a_400_with_the_wire_message() {
        let response = Error::Busy.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let api_error: ApiError = serde_json::from_slice(&body).unwrap();
        assert_eq!(api_error.error.code, "busy");
        assert_eq!(api_error.error.message, "to many active tasks");
    }

    #[tokio::test]
    async fn shutting_down_becomes_a_503() {
        let response = Error::ShuttingDown.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn not_found_task_becomes_a_400() {
        // the original wire contract reports unknown tasks as bad requests
        let response = Error::NotFound.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
