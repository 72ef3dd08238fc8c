use axum::extract::{Multipart, State};
use axum::http::header;
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use verifid_ocr::{fingerprint, IdCardFields, PipelineError};

use crate::error::ApiError;
use crate::AppState;

/// Multipart field carrying the document image.
pub const FILE_FIELD: &str = "file";

pub const SERVICE_NAME: &str = "ocr-service";

/// Declared content types accepted by `/verify-id`, compared verbatim.
pub const ALLOWED_CONTENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/jpg"];

/// The uploaded document as the client sent it.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Health {
    pub status: &'static str,
    pub service: &'static str,
}

/// Body of every post-validation `/verify-id` response; both variants are HTTP 200.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum VerifyResponse {
    Success { data: IdCardFields },
    Error { message: String },
}

impl From<Result<IdCardFields, PipelineError>> for VerifyResponse {
    fn from(result: Result<IdCardFields, PipelineError>) -> Self {
        match result {
            Ok(data) => VerifyResponse::Success { data },
            Err(e) => VerifyResponse::Error { message: e.to_string() },
        }
    }
}

/// Only the client-declared type is checked; the bytes are not sniffed.
pub fn validate_content_type(content_type: Option<&str>) -> Result<(), ApiError> {
    match content_type {
        Some(ct) if ALLOWED_CONTENT_TYPES.contains(&ct) => Ok(()),
        _ => Err(ApiError::InvalidContentType),
    }
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok", service: SERVICE_NAME })
}

pub async fn verify_id(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<VerifyResponse>, ApiError> {
    let upload = read_upload(&mut multipart).await?;

    let fingerprint = fingerprint(&upload.bytes);
    tracing::debug!(
        %fingerprint,
        content_type = upload.content_type.as_deref().unwrap_or_default(),
        bytes = upload.bytes.len(),
        "Upload accepted"
    );
    let result = state.pipeline.process(upload.bytes).await;
    match &result {
        Ok(fields) => tracing::info!(
            %fingerprint,
            id_found = fields.extracted_id.is_some(),
            dates = fields.extracted_dates.len(),
            lines = fields.lines.len(),
            "ID card processed"
        ),
        Err(e) => tracing::warn!(%fingerprint, error = %e, "ID card processing failed"),
    }

    Ok(Json(result.into()))
}

/// Find the `file` field, check its declared type, then read its bytes.
async fn read_upload(multipart: &mut Multipart) -> Result<UploadedFile, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // Raw header value; the parsed mime would lowercase it.
        let content_type = field
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Err(e) = validate_content_type(content_type.as_deref()) {
            tracing::info!(content_type = ?content_type, "Rejected upload");
            return Err(e);
        }
        let bytes = field.bytes().await?;
        return Ok(UploadedFile { content_type, bytes });
    }
    Err(ApiError::MissingField(FILE_FIELD))
}
