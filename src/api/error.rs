//! API error types with structured JSON responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::pipeline::extraction::ExtractionError;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Syllabus text is empty")]
    EmptyText,
    #[error("Syllabus text exceeds {limit} characters")]
    TextTooLarge { limit: usize },
    #[error("Term start {start} is after term end {end}")]
    InvalidTermWindow { start: String, end: String },
    #[error("Body is not text: {0}")]
    NotText(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "INVALID_REQUEST",
            ApiError::EmptyText => "EMPTY_TEXT",
            ApiError::TextTooLarge { .. } => "TEXT_TOO_LARGE",
            ApiError::InvalidTermWindow { .. } => "INVALID_TERM_WINDOW",
            ApiError::NotText(_) => "NOT_TEXT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_)
            | ApiError::EmptyText
            | ApiError::InvalidTermWindow { .. } => StatusCode::BAD_REQUEST,
            ApiError::TextTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotText(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message,
            },
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<ExtractionError> for ApiError {
    fn from(err: ExtractionError) -> Self {
        match err {
            ExtractionError::NotText(detail) => ApiError::NotText(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn invalid_request_returns_400() {
        let response = ApiError::InvalidRequest("missing field `text`".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "INVALID_REQUEST");
        assert!(json["error"]["message"].as_str().unwrap().contains("text"));
    }

    #[tokio::test]
    async fn empty_text_returns_400() {
        let response = ApiError::EmptyText.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "EMPTY_TEXT");
    }

    #[tokio::test]
    async fn oversized_text_returns_413() {
        let response = ApiError::TextTooLarge { limit: 10 }.into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "TEXT_TOO_LARGE");
        assert_eq!(json["error"]["message"], "Syllabus text exceeds 10 characters");
    }

    #[tokio::test]
    async fn term_window_error_names_both_dates() {
        let response = ApiError::InvalidTermWindow {
            start: "2025-12-01".into(),
            end: "2025-09-01".into(),
        }
        .into_response();
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "INVALID_TERM_WINDOW");
        let message = json["error"]["message"].as_str().unwrap();
        assert!(message.contains("2025-12-01") && message.contains("2025-09-01"));
    }

    #[tokio::test]
    async fn extraction_error_maps_to_not_text() {
        let err: ApiError = ExtractionError::NotText("invalid utf-8".into()).into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body_json(response).await["error"]["code"], "NOT_TEXT");
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let response = ApiError::Internal("parser task panicked".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "INTERNAL");
        assert_eq!(json["error"]["message"], "An internal error occurred");
    }
}
