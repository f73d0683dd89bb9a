//! The metric engine: PSNR, MSE and windowed SSIM over two decoded images.
//!
//! All functions are pure over two equal-shape [`PixelBuffer`]s; the only
//! side effect is the optional SSIM heatmap PNG. A shape mismatch is an
//! explicit [`PipelineError::DimensionMismatch`], never a sentinel value.

mod heatmap;

pub use heatmap::render_heatmap;

use std::path::Path;

use crate::error::{PipelineError, PipelineResult};
use crate::stats;
use crate::types::{PixelBuffer, Psnr, SsimScore};

/// Default SSIM window size in pixels.
pub const SSIM_WINDOW_SIZE: u32 = 8;

/// Peak sample value for 8-bit-per-channel images.
const MAX_PIXEL_VALUE: f64 = 255.0;

// SSIM stabilization constants, c1 = (k1*L)^2 and c2 = (k2*L)^2 with
// k1 = 0.01, k2 = 0.03, L = 255.
const C1: f64 = (0.01 * MAX_PIXEL_VALUE) * (0.01 * MAX_PIXEL_VALUE);
const C2: f64 = (0.03 * MAX_PIXEL_VALUE) * (0.03 * MAX_PIXEL_VALUE);

/// Per-pixel luma (Rec. 709 weights) for a buffer.
///
/// Greyscale buffers skip the conversion and use the channel directly.
pub fn luma(buffer: &PixelBuffer) -> Vec<f64> {
    let pixels = buffer.pixel_count();
    let mut out = Vec::with_capacity(pixels);
    if buffer.greyscale {
        for i in 0..pixels {
            let (v, _, _) = buffer.rgb(i);
            out.push(f64::from(v));
        }
    } else {
        for i in 0..pixels {
            let (r, g, b) = buffer.rgb(i);
            out.push(0.2126 * f64::from(r) + 0.7152 * f64::from(g) + 0.0722 * f64::from(b));
        }
    }
    out
}

fn check_shape(one: &PixelBuffer, two: &PixelBuffer) -> PipelineResult<()> {
    if !one.same_shape(two) {
        return Err(PipelineError::DimensionMismatch {
            one_width: one.width,
            one_height: one.height,
            two_width: two.width,
            two_height: two.height,
        });
    }
    Ok(())
}

/// Mean squared error over the channels in use (1 for greyscale, 3 for
/// color), averaged over pixels times channels.
pub fn mse(one: &PixelBuffer, two: &PixelBuffer) -> PipelineResult<f64> {
    check_shape(one, two)?;

    let greyscale = one.greyscale;
    let channels: usize = if greyscale { 1 } else { 3 };
    let pixels = one.pixel_count();

    let mut sum_squared_errors = 0.0;
    for i in 0..pixels {
        let (r1, g1, b1) = one.rgb(i);
        let (r2, g2, b2) = two.rgb(i);
        let dr = f64::from(r1) - f64::from(r2);
        sum_squared_errors += dr * dr;
        if !greyscale {
            let dg = f64::from(g1) - f64::from(g2);
            let db = f64::from(b1) - f64::from(b2);
            sum_squared_errors += dg * dg + db * db;
        }
    }

    Ok(sum_squared_errors / (pixels * channels) as f64)
}

/// Peak Signal-to-Noise Ratio between two equal-shape buffers.
pub fn psnr(one: &PixelBuffer, two: &PixelBuffer) -> PipelineResult<Psnr> {
    let mse = mse(one, two)?;
    if mse == 0.0 {
        return Ok(Psnr::Identical);
    }
    Ok(Psnr::Decibels(
        10.0 * ((MAX_PIXEL_VALUE * MAX_PIXEL_VALUE) / mse).log10(),
    ))
}

/// The window grid tiling an image: `(start_x, start_y, width, height)` per
/// cell, row-major. Boundary windows are clipped to the remaining extent.
pub fn window_grid(width: u32, height: u32, window_size: u32) -> Vec<(u32, u32, u32, u32)> {
    let windows_w = width.div_ceil(window_size);
    let windows_h = height.div_ceil(window_size);
    let mut grid = Vec::with_capacity((windows_w * windows_h) as usize);
    for wy in 0..windows_h {
        for wx in 0..windows_w {
            let start_x = wx * window_size;
            let start_y = wy * window_size;
            let w = window_size.min(width - start_x);
            let h = window_size.min(height - start_y);
            grid.push((start_x, start_y, w, h));
        }
    }
    grid
}

/// SSIM over one cell of a [`window_grid`] tiling, on the two luma planes.
///
/// Variance and covariance are the sample estimators; single-sample windows
/// have both defined as 0.0, under which the formula still returns exactly
/// 1.0 for identical inputs.
pub fn ssim_window(
    luma_one: &[f64],
    luma_two: &[f64],
    image_width: u32,
    cell: (u32, u32, u32, u32),
) -> f64 {
    let (start_x, start_y, window_w, window_h) = cell;
    let width = image_width as usize;
    let (start_x, start_y) = (start_x as usize, start_y as usize);
    let (window_w, window_h) = (window_w as usize, window_h as usize);
    debug_assert!(window_w > 0 && window_h > 0);

    let mut pixels_one = Vec::with_capacity(window_w * window_h);
    let mut pixels_two = Vec::with_capacity(window_w * window_h);
    for h in 0..window_h {
        let row = (start_y + h) * width + start_x;
        pixels_one.extend_from_slice(&luma_one[row..row + window_w]);
        pixels_two.extend_from_slice(&luma_two[row..row + window_w]);
    }

    let ux = stats::mean(&pixels_one);
    let uy = stats::mean(&pixels_two);
    let var_x = stats::variance(&pixels_one);
    let var_y = stats::variance(&pixels_two);
    let cov_xy = stats::covariance(&pixels_one, &pixels_two);

    let num = (2.0 * ux * uy + C1) * (2.0 * cov_xy + C2);
    let den = (ux * ux + uy * uy + C1) * (var_x + var_y + C2);

    num / den
}

/// Windowed SSIM between two equal-shape buffers.
///
/// Tiles the image into `ceil(w/window) x ceil(h/window)` windows, computes
/// SSIM per window and aggregates mean, minimum and sample variance. When
/// `heatmap_path` is given, a one-pixel-per-window 16-bit greyscale PNG is
/// written there.
pub fn ssim(
    one: &PixelBuffer,
    two: &PixelBuffer,
    window_size: u32,
    heatmap_path: Option<&Path>,
) -> PipelineResult<SsimScore> {
    check_shape(one, two)?;

    let luma_one = luma(one);
    let luma_two = luma(two);

    let windows_w = one.width.div_ceil(window_size);
    let windows_h = one.height.div_ceil(window_size);
    let grid = window_grid(one.width, one.height, window_size);

    let mut scores = Vec::with_capacity(grid.len());
    let mut mean = 0.0;
    let mut min = 1.0_f64;
    for &cell in &grid {
        let score = ssim_window(&luma_one, &luma_two, one.width, cell);
        mean += score;
        min = min.min(score);
        scores.push(score);
    }
    mean /= scores.len() as f64;
    let variance = stats::variance(&scores);

    if let Some(path) = heatmap_path {
        render_heatmap(&scores, windows_w, windows_h, path)?;
    }

    Ok(SsimScore {
        mean,
        min,
        variance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(width: u32, height: u32, greyscale: bool, value: u8) -> PixelBuffer {
        PixelBuffer {
            width,
            height,
            greyscale,
            samples: vec![value; (width * height * 3) as usize],
        }
    }

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        let mut samples = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                let v = ((x * 7 + y * 13) % 251) as u8;
                samples.extend_from_slice(&[v, v.wrapping_add(40), v.wrapping_mul(3)]);
            }
        }
        PixelBuffer {
            width,
            height,
            greyscale: false,
            samples,
        }
    }

    #[test]
    fn test_luma_weights() {
        let mut buf = flat(1, 1, false, 0);
        buf.samples = vec![255, 0, 0];
        assert!((luma(&buf)[0] - 0.2126 * 255.0).abs() < 1e-9);
        buf.samples = vec![0, 255, 0];
        assert!((luma(&buf)[0] - 0.7152 * 255.0).abs() < 1e-9);
        buf.samples = vec![0, 0, 255];
        assert!((luma(&buf)[0] - 0.0722 * 255.0).abs() < 1e-9);
    }

    #[test]
    fn test_luma_greyscale_passthrough() {
        let buf = flat(2, 2, true, 99);
        assert_eq!(luma(&buf), vec![99.0; 4]);
    }

    #[test]
    fn test_mse_known_value() {
        let a = flat(4, 4, false, 0);
        let b = flat(4, 4, false, 2);
        // every channel differs by 2
        assert_eq!(mse(&a, &b).unwrap(), 4.0);
    }

    #[test]
    fn test_mse_greyscale_single_channel() {
        let a = flat(4, 4, true, 0);
        let mut b = flat(4, 4, true, 0);
        // one pixel differs by 10 in a 16-pixel greyscale image
        b.samples[0] = 10;
        b.samples[1] = 10;
        b.samples[2] = 10;
        assert_eq!(mse(&a, &b).unwrap(), 100.0 / 16.0);
    }

    #[test]
    fn test_psnr_identical_sentinel() {
        let a = gradient(16, 16);
        match psnr(&a, &a.clone()).unwrap() {
            Psnr::Identical => {}
            other => panic!("expected Identical, got {other:?}"),
        }
    }

    #[test]
    fn test_psnr_known_value() {
        let a = flat(8, 8, false, 0);
        let b = flat(8, 8, false, 1);
        // mse = 1.0, psnr = 10*log10(255^2)
        match psnr(&a, &b).unwrap() {
            Psnr::Decibels(db) => assert!((db - 10.0 * 65025.0_f64.log10()).abs() < 1e-9),
            Psnr::Identical => panic!("images differ"),
        }
    }

    #[test]
    fn test_dimension_mismatch_both_metrics() {
        let a = flat(10, 10, false, 0);
        let b = flat(12, 12, false, 0);
        assert!(matches!(
            psnr(&a, &b),
            Err(PipelineError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            ssim(&a, &b, SSIM_WINDOW_SIZE, None),
            Err(PipelineError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_window_grid_tiles_exactly_once() {
        // 10x10 with 8-pixel windows: 2x2 grid, clipped boundary cells
        let grid = window_grid(10, 10, 8);
        assert_eq!(grid.len(), 4);
        let mut covered = vec![0u32; 100];
        for (x, y, w, h) in &grid {
            assert!(*w > 0 && *h > 0);
            for dy in 0..*h {
                for dx in 0..*w {
                    covered[((y + dy) * 10 + x + dx) as usize] += 1;
                }
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
        // boundary windows have area < 64
        assert!(grid.iter().any(|(_, _, w, h)| w * h < 64));
    }

    #[test]
    fn test_ssim_self_comparison_is_exactly_one() {
        let a = gradient(20, 14);
        let score = ssim(&a, &a.clone(), SSIM_WINDOW_SIZE, None).unwrap();
        assert_eq!(score.mean, 1.0);
        assert_eq!(score.min, 1.0);
        assert_eq!(score.variance, 0.0);
    }

    #[test]
    fn test_ssim_zero_greyscale_16x16() {
        // 4 windows of flat zero luma; c1/c2 keep the formula at exactly 1.0
        let a = flat(16, 16, true, 0);
        let score = ssim(&a, &a.clone(), 8, None).unwrap();
        assert_eq!(score.mean, 1.0);
        assert_eq!(score.min, 1.0);
        assert_eq!(score.variance, 0.0);
    }

    #[test]
    fn test_ssim_window_flat_identical_patch() {
        let luma = vec![127.0; 64];
        let s = ssim_window(&luma, &luma, 8, (0, 0, 8, 8));
        assert_eq!(s, 1.0);
    }

    #[test]
    fn test_ssim_window_single_pixel() {
        // 1x1 window (degenerate): variances defined as zero
        let one = vec![10.0];
        let two = vec![10.0];
        assert_eq!(ssim_window(&one, &two, 1, (0, 0, 1, 1)), 1.0);
    }

    #[test]
    fn test_ssim_detects_difference() {
        let a = gradient(32, 32);
        let mut b = a.clone();
        for s in b.samples.iter_mut().take(32 * 3 * 8) {
            *s = s.wrapping_add(60);
        }
        let score = ssim(&a, &b, SSIM_WINDOW_SIZE, None).unwrap();
        assert!(score.mean < 1.0);
        assert!(score.min < score.mean);
        assert!(score.variance > 0.0);
    }
}
