use std::ffi::OsStr;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use image::DynamicImage;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Tesseract not available: {0}")]
    NotAvailable(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Failed to encode image for OCR: {0}")]
    Encode(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstraction over an OCR backend.
/// Implementations accept a decoded bitmap and return the recognized text.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set string, or a pre-set failure, without looking at the image.
pub struct MockRecognizer {
    outcome: Result<String, String>,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { outcome: Ok(text.into()) }
    }

    /// A recognizer whose every call fails with [`OcrError::Engine`].
    pub fn failing(message: impl Into<String>) -> Self {
        Self { outcome: Err(message.into()) }
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image: &DynamicImage) -> Result<String, OcrError> {
        self.outcome.clone().map_err(OcrError::Engine)
    }
}

// ── Tesseract command-line backend ────────────────────────────────────────────

pub const DEFAULT_TESSERACT_COMMAND: &str = "tesseract";

const WINDOWS_INSTALL_PATHS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
];

/// Engine invocation settings. Language and modes are fixed for ID cards:
/// English, LSTM engine (`--oem 3`), single uniform block of text (`--psm 6`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TesseractConfig {
    pub command: PathBuf,
    pub language: String,
    pub engine_mode: u8,
    pub page_segmentation_mode: u8,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from(DEFAULT_TESSERACT_COMMAND),
            language: "eng".to_string(),
            engine_mode: 3,
            page_segmentation_mode: 6,
        }
    }
}

impl TesseractConfig {
    pub fn with_command(command: impl Into<PathBuf>) -> Self {
        Self { command: command.into(), ..Self::default() }
    }

    /// Arguments after the executable: read PNG from stdin, write text to stdout.
    pub fn args(&self) -> Vec<String> {
        vec![
            "stdin".to_string(),
            "stdout".to_string(),
            "-l".to_string(),
            self.language.clone(),
            "--oem".to_string(),
            self.engine_mode.to_string(),
            "--psm".to_string(),
            self.page_segmentation_mode.to_string(),
        ]
    }
}

/// Find the Tesseract executable once at startup.
///
/// Order: the explicitly configured path, `tesseract` on `PATH`, then the
/// default Windows install locations.
pub fn locate_tesseract(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        tracing::warn!("Configured Tesseract path does not exist: {}", path.display());
    }

    let exe_name = format!("{DEFAULT_TESSERACT_COMMAND}{}", std::env::consts::EXE_SUFFIX);
    if let Some(found) = std::env::var_os("PATH")
        .and_then(|paths| find_in_path(&paths, &exe_name))
    {
        return Some(found);
    }

    WINDOWS_INSTALL_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

fn find_in_path(paths: &OsStr, exe_name: &str) -> Option<PathBuf> {
    std::env::split_paths(paths)
        .map(|dir| dir.join(exe_name))
        .find(|candidate| candidate.is_file())
}

/// Runs the `tesseract` executable, piping the image through stdin.
pub struct TesseractCli {
    config: TesseractConfig,
}

impl TesseractCli {
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TesseractConfig {
        &self.config
    }
}

impl OcrBackend for TesseractCli {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let png = encode_as_png(image)?;

        let mut child = Command::new(&self.config.command)
            .args(self.config.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => OcrError::NotAvailable(format!(
                    "{} not found (install tesseract-ocr or set TESSERACT_CMD)",
                    self.config.command.display()
                )),
                _ => OcrError::Io(e),
            })?;

        // Tesseract reads all of stdin before writing, so feed it fully and close it.
        // An engine that dies early (missing traineddata) closes the pipe; its exit
        // status and stderr below say why.
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&png) {
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::debug!("tesseract closed stdin before reading the whole image");
                }
                other => other?,
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

pub(crate) fn encode_as_png(image: &DynamicImage) -> Result<Vec<u8>, OcrError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| OcrError::Encode(e.to_string()))?;
    Ok(buf)
}

// ── In-process Tesseract backend (optional, gated behind `leptess` feature) ────

#[cfg(feature = "leptess")]
pub mod leptess_backend {
    use super::{encode_as_png, OcrBackend, OcrError, TesseractConfig};
    use image::DynamicImage;
    use leptess::{LepTess, Variable};

    /// Links libtesseract directly. The default engine mode of
    /// `LepTess::new` is already the LSTM/default mode 3.
    pub struct LeptessRecognizer {
        data_path: Option<String>,
        config: TesseractConfig,
    }

    impl LeptessRecognizer {
        pub fn new(data_path: Option<String>, config: TesseractConfig) -> Self {
            Self { data_path, config }
        }
    }

    impl OcrBackend for LeptessRecognizer {
        fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
            let png = encode_as_png(image)?;
            let mut lt = LepTess::new(self.data_path.as_deref(), &self.config.language)
                .map_err(|e| OcrError::NotAvailable(e.to_string()))?;
            lt.set_variable(
                Variable::TesseditPagesegMode,
                &self.config.page_segmentation_mode.to_string(),
            )
            .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.set_image_from_mem(&png)
                .map_err(|e| OcrError::Engine(e.to_string()))?;
            lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
        }
    }
}
