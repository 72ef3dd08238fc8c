//! Client-facing errors raised before the pipeline runs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub const INVALID_FILE_TYPE: &str = "Invalid file type. Only JPEG/PNG allowed.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid file type. Only JPEG/PNG allowed.")]
    InvalidContentType,

    #[error("Missing upload field '{0}'.")]
    MissingField(&'static str),

    /// The multipart body could not be read (malformed, or over the size limit).
    #[error("{message}")]
    Upload { status: StatusCode, message: String },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidContentType => StatusCode::BAD_REQUEST,
            ApiError::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upload { status, .. } => *status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorDetail { detail: self.to_string() };
        (status, Json(body)).into_response()
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ApiError::Upload { status: err.status(), message: err.body_text() }
    }
}
