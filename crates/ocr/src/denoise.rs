//! Non-local-means denoising for single-channel images.
//!
//! Every output pixel is a weighted average of the pixels inside a
//! `search_window`² neighbourhood. A candidate's weight depends on how much
//! the `template_window`² patch around it resembles the patch around the
//! pixel being filtered:
//!
//! ```text
//! w = exp(-d / h²)        d = mean squared difference between the two patches
//! ```
//!
//! Weights below [`WEIGHT_THRESHOLD`] are treated as zero. Borders are
//! mirrored without repeating the edge pixel (`dcb|abcd|cba`).
//!
//! Patch distances are computed one search offset at a time: for a fixed
//! offset the per-pixel squared differences are summed into an integral
//! image, so each patch distance costs four lookups regardless of the
//! template size.

use image::{GrayImage, ImageBuffer, Luma};

const WEIGHT_THRESHOLD: f32 = 0.001;

const MAX_SQUARED_DIFF: usize = 255 * 255;

pub fn non_local_means(
    src: &GrayImage,
    h: f32,
    template_window: u32,
    search_window: u32,
) -> GrayImage {
    let (width, height) = src.dimensions();
    if width == 0 || height == 0 {
        return src.clone();
    }

    let w = width as usize;
    let ht = height as usize;
    let t = template_window.max(1) as usize;
    let tr = t / 2;
    let sr = (search_window.max(1) / 2) as usize;
    let pad = sr + tr;

    let (padded, pw) = pad_reflect_101(src, pad as u32);
    let weight_of = weight_table(h);

    // Difference region: the image grown by the template radius on each side.
    let dw = w + 2 * tr;
    let dh = ht + 2 * tr;
    let stride = dw + 1;
    let mut integral = vec![0u64; stride * (dh + 1)];

    let area = (t * t) as u64;
    let mut weight_sum = vec![0f32; w * ht];
    let mut value_sum = vec![0f32; w * ht];

    for dy in 0..=2 * sr {
        for dx in 0..=2 * sr {
            // Region (i, j) sits at padded (i + sr, j + sr); its candidate at (i + dx, j + dy).
            for j in 0..dh {
                let a_row = (j + sr) * pw + sr;
                let b_row = (j + dy) * pw + dx;
                let mut row_acc = 0u64;
                for i in 0..dw {
                    let diff = i32::from(padded[a_row + i]) - i32::from(padded[b_row + i]);
                    row_acc += (diff * diff) as u64;
                    integral[(j + 1) * stride + i + 1] = integral[j * stride + i + 1] + row_acc;
                }
            }

            for y in 0..ht {
                for x in 0..w {
                    let ssd = integral[(y + t) * stride + x + t] + integral[y * stride + x]
                        - integral[y * stride + x + t]
                        - integral[(y + t) * stride + x];
                    let mean = ((ssd + area / 2) / area) as usize;
                    let weight = weight_of[mean.min(MAX_SQUARED_DIFF)];
                    if weight == 0.0 {
                        continue;
                    }
                    let candidate = padded[(y + tr + dy) * pw + x + tr + dx];
                    let idx = y * w + x;
                    weight_sum[idx] += weight;
                    value_sum[idx] += weight * f32::from(candidate);
                }
            }
        }
    }

    ImageBuffer::from_fn(width, height, |x, y| {
        let idx = y as usize * w + x as usize;
        let v = if weight_sum[idx] > 0.0 {
            (value_sum[idx] / weight_sum[idx]).round()
        } else {
            f32::from(src.get_pixel(x, y)[0])
        };
        Luma([v.clamp(0.0, 255.0) as u8])
    })
}

/// `exp(-d / h²)` for every possible mean squared difference, thresholded.
fn weight_table(h: f32) -> Vec<f32> {
    let h2 = (h * h).max(f32::EPSILON);
    (0..=MAX_SQUARED_DIFF)
        .map(|d| {
            let w = (-(d as f32) / h2).exp();
            if w < WEIGHT_THRESHOLD { 0.0 } else { w }
        })
        .collect()
}

/// Copy `src` into a buffer grown by `pad` on every side, mirroring across the edges.
fn pad_reflect_101(src: &GrayImage, pad: u32) -> (Vec<u8>, usize) {
    let (w, h) = src.dimensions();
    let pw = (w + 2 * pad) as usize;
    let ph = (h + 2 * pad) as usize;
    let mut out = Vec::with_capacity(pw * ph);
    for py in 0..ph {
        let sy = reflect_101(py as i64 - i64::from(pad), h);
        for px in 0..pw {
            let sx = reflect_101(px as i64 - i64::from(pad), w);
            out.push(src.get_pixel(sx, sy)[0]);
        }
    }
    (out, pw)
}

/// Map `i` into `0..len` by reflecting about the first and last index.
/// Pads wider than the image keep bouncing between the two edges.
fn reflect_101(i: i64, len: u32) -> u32 {
    if len <= 1 {
        return 0;
    }
    let last = i64::from(len) - 1;
    let m = i.rem_euclid(2 * last);
    (if m <= last { m } else { 2 * last - m }) as u32
}
