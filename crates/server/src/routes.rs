use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::health))
        .route("/verify-id", post(handlers::verify_id))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
    use std::io::Cursor;
    use std::sync::Arc;
    use tower::ServiceExt;
    use verifid_ocr::{
        DocumentPreprocessor, IdCardPipeline, MockRecognizer, OcrBackend, Preprocess,
        PreprocessError,
    };

    const BOUNDARY: &str = "verifid-test-boundary";

    struct FaultyPreprocessor;

    impl Preprocess for FaultyPreprocessor {
        fn preprocess(&self, _image: &DynamicImage) -> Result<GrayImage, PreprocessError> {
            Err(PreprocessError::EmptyImage)
        }
    }

    fn app_with(
        recognizer: impl OcrBackend + 'static,
        preprocessor: impl Preprocess + 'static,
    ) -> Router {
        create_router(AppState {
            pipeline: IdCardPipeline::new(Arc::new(recognizer), Arc::new(preprocessor), 2),
            max_upload_bytes: 1024 * 1024,
        })
    }

    fn app(text: &str) -> Router {
        app_with(MockRecognizer::new(text), DocumentPreprocessor::default())
    }

    fn card_png() -> Vec<u8> {
        let img: GrayImage =
            ImageBuffer::from_fn(16, 10, |x, _| Luma([if x == 8 { 0u8 } else { 230 }]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn multipart_body(name: &str, content_type: Option<&str>, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"card\"\r\n")
                .as_bytes(),
        );
        if let Some(ct) = content_type {
            body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(name: &str, content_type: Option<&str>, data: &[u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/verify-id")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(name, content_type, data)))
            .unwrap()
    }

    fn health_request() -> Request<Body> {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    // ── Health ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn health_reports_service() {
        let (status, json) = send(app(""), health_request()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"status": "ok", "service": "ocr-service"}));
    }

    #[tokio::test]
    async fn health_unaffected_by_failed_requests() {
        let app = app_with(MockRecognizer::failing("down"), DocumentPreprocessor::default());

        send(app.clone(), upload("file", Some("image/png"), &card_png())).await;
        send(app.clone(), upload("file", Some("image/gif"), b"GIF89a")).await;

        let (status, json) = send(app, health_request()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({"status": "ok", "service": "ocr-service"}));
    }

    // ── Content-type gate ────────────────────────────────────────────────────

    #[tokio::test]
    async fn accepts_each_allowed_content_type() {
        for ct in ["image/jpeg", "image/png", "image/jpg"] {
            let (status, json) = send(app("X"), upload("file", Some(ct), &card_png())).await;
            assert_eq!(status, StatusCode::OK, "{ct}");
            assert_eq!(json["status"], "success", "{ct}");
        }
    }

    #[tokio::test]
    async fn rejects_other_content_types_with_400() {
        for ct in [
            Some("image/gif"),
            Some("application/octet-stream"),
            Some("image/pjpeg"),
            Some("IMAGE/PNG"),
            Some("Image/Jpeg"),
            None,
        ] {
            let (status, json) = send(app("X"), upload("file", ct, &card_png())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{ct:?}");
            assert_eq!(
                json,
                serde_json::json!({"detail": "Invalid file type. Only JPEG/PNG allowed."})
            );
        }
    }

    #[tokio::test]
    async fn missing_file_field_is_422() {
        let request = upload("document", Some("image/png"), &card_png());
        let (status, json) = send(app("X"), request).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["detail"], "Missing upload field 'file'.");
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let app = create_router(AppState {
            pipeline: IdCardPipeline::new(
                Arc::new(MockRecognizer::new("X")),
                Arc::new(DocumentPreprocessor::default()),
                1,
            ),
            max_upload_bytes: 64,
        });
        let (status, _) = send(app, upload("file", Some("image/png"), &[0u8; 4096])).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    // ── Pipeline outcomes ────────────────────────────────────────────────────

    #[tokio::test]
    async fn success_payload_carries_extracted_fields() {
        let text = "ID: 12345678\nDOB: 01/02/1990\n\n  \nExpiry 2030-12-31";
        let (status, json) = send(app(text), upload("file", Some("image/png"), &card_png())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json,
            serde_json::json!({
                "status": "success",
                "data": {
                    "raw_text": text,
                    "extracted_id": "12345678",
                    "extracted_dates": ["01/02/1990", "2030-12-31"],
                    "lines": ["ID: 12345678", "DOB: 01/02/1990", "Expiry 2030-12-31"],
                }
            })
        );
    }

    #[tokio::test]
    async fn no_id_serializes_as_null() {
        let request = upload("file", Some("image/jpeg"), &card_png());
        let (_, json) = send(app("nothing here"), request).await;
        assert!(json["data"]["extracted_id"].is_null());
        assert_eq!(json["data"]["extracted_dates"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn preprocessing_fault_still_succeeds() {
        let app = app_with(MockRecognizer::new("12345678"), FaultyPreprocessor);
        let (status, json) = send(app, upload("file", Some("image/png"), &card_png())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert_eq!(json["data"]["extracted_id"], "12345678");
    }

    #[tokio::test]
    async fn ocr_failure_is_200_error_payload() {
        let app = app_with(
            MockRecognizer::failing("engine unavailable"),
            DocumentPreprocessor::default(),
        );
        let (status, json) = send(app, upload("file", Some("image/png"), &card_png())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "error");
        let message = json["message"].as_str().unwrap();
        assert!(message.contains("engine unavailable"), "{message}");
        assert!(json.get("data").is_none());
    }

    #[tokio::test]
    async fn undecodable_image_is_200_error_payload() {
        // Declared type passes the gate; the bytes are not an image.
        let request = upload("file", Some("image/jpeg"), b"%PDF-1.7");
        let (status, json) = send(app("X"), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "error");
        assert!(!json["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn declared_type_need_not_match_bytes() {
        // PNG bytes declared as JPEG decode fine.
        let request = upload("file", Some("image/jpeg"), &card_png());
        let (status, json) = send(app("X"), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
    }

    #[tokio::test]
    async fn same_upload_twice_same_response() {
        let app = app("Name\n11112222\n12-12-2012");
        let (_, first) = send(app.clone(), upload("file", Some("image/png"), &card_png())).await;
        let (_, second) = send(app, upload("file", Some("image/png"), &card_png())).await;
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn configured_engine_path_is_used() {
        use crate::config::ServerConfig;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("tesseract");
        std::fs::write(
            &script,
            "#!/bin/sh\ncat > /dev/null\nprintf 'CARD 24681357\\nDOB 1990-02-01\\n'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = ServerConfig {
            tesseract_cmd: Some(script),
            max_concurrent_jobs: 1,
            ..ServerConfig::default()
        };
        let app = create_router(AppState::from_config(&config));

        let (status, json) = send(app, upload("file", Some("image/png"), &card_png())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["extracted_id"], "24681357");
        assert_eq!(json["data"]["extracted_dates"], serde_json::json!(["1990-02-01"]));
        assert_eq!(
            json["data"]["lines"],
            serde_json::json!(["CARD 24681357", "DOB 1990-02-01"])
        );
    }
}
