use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::counter;
use thiserror::Error;

use crate::types::ErrorResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Empty text provided")]
    EmptyText,

    #[error("{0}")]
    MalformedRequest(String),

    /// Failure inside the vectorizer or classifier.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::EmptyText => "empty_text",
            ApiError::MalformedRequest(_) => "malformed_request",
            ApiError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::EmptyText | ApiError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::MalformedRequest(rejection.body_text())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{err:#}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        counter!("prediction_errors_total", "kind" => self.kind()).increment(1);
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
