//! HTTP front end for the ID card OCR pipeline.
//!
//! - `GET /`: health probe
//! - `POST /verify-id`: multipart image upload → OCR → extracted fields

pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod telemetry;

use std::sync::Arc;

use verifid_ocr::{
    locate_tesseract, DocumentPreprocessor, IdCardPipeline, PreprocessConfig, TesseractCli,
    TesseractConfig,
};

use crate::config::ServerConfig;

pub use routes::create_router;

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: IdCardPipeline,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// Wire the real Tesseract and preprocessing backends from startup config.
    pub fn from_config(config: &ServerConfig) -> Self {
        let command = match locate_tesseract(config.tesseract_cmd.as_deref()) {
            Some(path) => {
                tracing::info!("Using Tesseract at {}", path.display());
                path
            }
            None => {
                tracing::warn!(
                    "Tesseract not found in standard locations; \
                     OCR requests will fail until it is installed"
                );
                config
                    .tesseract_cmd
                    .clone()
                    .unwrap_or_else(|| TesseractConfig::default().command)
            }
        };

        let recognizer = TesseractCli::new(TesseractConfig::with_command(command));
        let preprocessor = DocumentPreprocessor::new(PreprocessConfig {
            max_pixels: config.max_preprocess_pixels,
            ..PreprocessConfig::default()
        });

        Self {
            pipeline: IdCardPipeline::new(
                Arc::new(recognizer),
                Arc::new(preprocessor),
                config.max_concurrent_jobs,
            ),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

/// Bind and serve until ctrl-c.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config);
    let app = create_router(state);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Starting server at http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
