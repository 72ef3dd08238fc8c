pub mod denoise;
pub mod extract;
pub mod hash;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use extract::Extractor;
pub use hash::{fingerprint, sha256_bytes, to_hex};
pub use pipeline::{IdCardPipeline, PipelineError};
pub use preprocess::{
    try_preprocess, DocumentPreprocessor, Preprocess, PreprocessConfig, PreprocessError,
    DEFAULT_MAX_PIXELS,
};
pub use recognizer::{
    locate_tesseract, MockRecognizer, OcrBackend, OcrError, TesseractCli, TesseractConfig,
};
pub use types::IdCardFields;
