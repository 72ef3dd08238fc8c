use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::extract::Extractor;
use crate::hash;
use crate::preprocess::{self, Preprocess};
use crate::recognizer::{OcrBackend, OcrError};
use crate::types::IdCardFields;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Decode(#[from] image::ImageError),
    #[error("{0}")]
    Ocr(#[from] OcrError),
    #[error("OCR worker failed: {0}")]
    Worker(String),
}

/// Orchestrates: decode → preprocess (best effort) → OCR → extract.
///
/// Cheap to clone; clones share the backends and the worker limit.
#[derive(Clone)]
pub struct IdCardPipeline {
    recognizer: Arc<dyn OcrBackend>,
    preprocessor: Arc<dyn Preprocess>,
    workers: Arc<Semaphore>,
}

impl IdCardPipeline {
    pub fn new(
        recognizer: Arc<dyn OcrBackend>,
        preprocessor: Arc<dyn Preprocess>,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            recognizer,
            preprocessor,
            workers: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    /// Run the whole pipeline on the calling thread.
    pub fn process_blocking(&self, data: &[u8]) -> Result<IdCardFields, PipelineError> {
        // 1. Decode whatever format the bytes actually are.
        let image = image::load_from_memory(data)?;

        // 2. Clean up; never fails, falls back to the decoded image.
        let image = preprocess::try_preprocess(self.preprocessor.as_ref(), image);

        // 3. Run OCR.
        let ocr_text = self.recognizer.recognize(&image)?;

        // 4. Extract structured fields.
        Ok(Extractor::extract(&ocr_text))
    }

    /// Run the pipeline on tokio's blocking pool, at most `max_concurrent_jobs` at a time.
    ///
    /// The worker permit travels with the blocking job, so dropping the returned
    /// future (client gone, timeout) does not free the slot while the job still runs.
    pub async fn process(&self, data: Bytes) -> Result<IdCardFields, PipelineError> {
        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))?;

        let fingerprint = hash::fingerprint(&data);
        tracing::debug!(%fingerprint, bytes = data.len(), "Starting ID card pipeline");

        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || {
            let result = pipeline.process_blocking(&data);
            drop(permit);
            result
        })
        .await
        .map_err(|e| PipelineError::Worker(e.to_string()))?
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
