//! SSIM heatmap rendering.
//!
//! One pixel per SSIM window, 16-bit greyscale, persisted as PNG. The image
//! dimensions are the window grid dimensions, not the source image's.

use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};

use crate::error::{PipelineError, PipelineResult};

/// Render per-window SSIM scores to a greyscale PNG at `path`.
///
/// Intensity is `round(65535 * score)` clamped to the valid sample range,
/// so negative SSIM values render black.
pub fn render_heatmap(
    scores: &[f64],
    windows_w: u32,
    windows_h: u32,
    path: &Path,
) -> PipelineResult<()> {
    let max = f64::from(u16::MAX);
    let data: Vec<u16> = scores
        .iter()
        .map(|score| (max * score).round().clamp(0.0, max) as u16)
        .collect();

    let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(windows_w, windows_h, data).ok_or_else(|| {
            PipelineError::HeatmapWrite {
                path: path.to_path_buf(),
                message: "score count does not match window grid".to_string(),
            }
        })?;

    DynamicImage::ImageLuma16(buffer)
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| PipelineError::HeatmapWrite {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    tracing::trace!("Heatmap written: {:?} ({}x{})", path, windows_w, windows_h);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heatmap_dimensions_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heatmap.png");
        // scores below zero clamp to black, 1.0 saturates
        render_heatmap(&[1.0, 0.5, 0.0, -0.2], 2, 2, &path).unwrap();

        let img = image::open(&path).unwrap().into_luma16();
        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(img.get_pixel(0, 0).0[0], u16::MAX);
        assert_eq!(img.get_pixel(1, 0).0[0], (0.5f64 * 65535.0).round() as u16);
        assert_eq!(img.get_pixel(0, 1).0[0], 0);
        assert_eq!(img.get_pixel(1, 1).0[0], 0);
    }

    #[test]
    fn test_heatmap_rejects_bad_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.png");
        let err = render_heatmap(&[1.0; 3], 2, 2, &path).unwrap_err();
        assert!(matches!(err, PipelineError::HeatmapWrite { .. }));
    }
}
