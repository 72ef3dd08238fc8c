use std::panic::{self, AssertUnwindSafe};

use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;
use thiserror::Error;

use crate::denoise;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("Image has no pixels")]
    EmptyImage,
    #[error("Image too large to preprocess: {pixels} pixels (limit {limit})")]
    TooLarge { pixels: u64, limit: u64 },
}

/// Turns a decoded bitmap into a single-channel image better suited to OCR.
pub trait Preprocess: Send + Sync {
    fn preprocess(&self, image: &DynamicImage) -> Result<GrayImage, PreprocessError>;
}

/// About 12 MP. Denoising needs roughly 17 bytes of scratch per pixel and
/// several seconds per megapixel, so bigger scans skip preprocessing.
pub const DEFAULT_MAX_PIXELS: u64 = 12_000_000;

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Side of the square neighbourhood used for the local mean (odd).
    pub block_size: u32,
    /// Subtracted from the local mean before comparing.
    pub offset: i16,
    /// Non-local-means filter strength `h`.
    pub denoise_strength: f32,
    pub template_window: u32,
    pub search_window: u32,
    /// Images above this many pixels are passed through untouched.
    pub max_pixels: u64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            block_size: 11,
            offset: 2,
            denoise_strength: 10.0,
            template_window: 7,
            search_window: 21,
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

/// Grayscale → Gaussian adaptive threshold → non-local-means denoise.
#[derive(Debug, Clone, Default)]
pub struct DocumentPreprocessor {
    config: PreprocessConfig,
}

impl DocumentPreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }
}

impl Preprocess for DocumentPreprocessor {
    fn preprocess(&self, image: &DynamicImage) -> Result<GrayImage, PreprocessError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PreprocessError::EmptyImage);
        }
        let pixels = u64::from(image.width()) * u64::from(image.height());
        if pixels > self.config.max_pixels {
            return Err(PreprocessError::TooLarge { pixels, limit: self.config.max_pixels });
        }

        let gray = to_grayscale(image);
        let binary = adaptive_threshold_gaussian(&gray, self.config.block_size, self.config.offset);
        Ok(denoise::non_local_means(
            &binary,
            self.config.denoise_strength,
            self.config.template_window,
            self.config.search_window,
        ))
    }
}

/// Run `preprocessor`, handing back the untouched input if it errors or panics.
pub fn try_preprocess(preprocessor: &dyn Preprocess, image: DynamicImage) -> DynamicImage {
    match panic::catch_unwind(AssertUnwindSafe(|| preprocessor.preprocess(&image))) {
        Ok(Ok(processed)) => DynamicImage::ImageLuma8(processed),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Preprocessing failed, falling back to original image");
            image
        }
        Err(_) => {
            tracing::warn!("Preprocessing panicked, falling back to original image");
            image
        }
    }
}

// ── Grayscale ─────────────────────────────────────────────────────────────────

// BT.601 luma in 14-bit fixed point.
const R_TO_Y: u32 = 4899;
const G_TO_Y: u32 = 9617;
const B_TO_Y: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// `image` keeps colour in R,G,B order, so no channel swap is needed before weighting.
fn to_grayscale(image: &DynamicImage) -> GrayImage {
    if !image.color().has_color() {
        return image.to_luma8();
    }
    let rgb = image.to_rgb8();
    ImageBuffer::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        Luma([luma_bt601(r, g, b)])
    })
}

fn luma_bt601(r: u8, g: u8, b: u8) -> u8 {
    let y = u32::from(r) * R_TO_Y
        + u32::from(g) * G_TO_Y
        + u32::from(b) * B_TO_Y
        + (1 << (LUMA_SHIFT - 1));
    (y >> LUMA_SHIFT) as u8
}

// ── Adaptive threshold ────────────────────────────────────────────────────────

/// Binarize against a Gaussian-weighted local mean: white where `src > mean - offset`.
fn adaptive_threshold_gaussian(gray: &GrayImage, block_size: u32, offset: i16) -> GrayImage {
    let mean = gaussian_mean(gray, block_size);

    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        let src = i16::from(gray.get_pixel(x, y)[0]);
        let local = i16::from(mean.get_pixel(x, y)[0]);
        Luma([if src > local - offset { 255 } else { 0 }])
    })
}

/// Gaussian blur with replicated borders, rounded back to 8 bits.
///
/// Filtering a `u8` buffer directly would truncate after each pass, so both
/// passes run on `f32` samples.
fn gaussian_mean(gray: &GrayImage, block_size: u32) -> GrayImage {
    let samples: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
            Luma([f32::from(gray.get_pixel(x, y)[0])])
        });
    let blurred = separable_filter_equal(&samples, &gaussian_kernel(block_size));

    ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([blurred.get_pixel(x, y)[0].round().clamp(0.0, 255.0) as u8])
    })
}

/// Normalized 1-D Gaussian with sigma derived from the kernel size.
fn gaussian_kernel(size: u32) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as i32;
    let raw: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = raw.iter().sum();
    raw.into_iter().map(|k| k / sum).collect()
}
