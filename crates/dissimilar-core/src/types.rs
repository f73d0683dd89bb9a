//! Core data types for the Dissimilar comparison pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A decoded image, normalized to 8-bit-per-channel RGB.
///
/// Greyscale sources keep the flag set so the metric engine can use the
/// single channel directly (all three stored channels are equal for them).
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Whether the source image was greyscale
    pub greyscale: bool,

    /// Interleaved RGB samples, `3 * width * height` bytes
    pub samples: Vec<u8>,
}

impl PixelBuffer {
    /// Number of pixels in the buffer.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether two buffers have the same shape and may be compared.
    pub fn same_shape(&self, other: &PixelBuffer) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Red, green and blue samples of pixel `i`.
    #[inline]
    pub fn rgb(&self, i: usize) -> (u8, u8, u8) {
        let base = i * 3;
        (
            self.samples[base],
            self.samples[base + 1],
            self.samples[base + 2],
        )
    }
}

/// Peak Signal-to-Noise Ratio result.
///
/// PSNR is mathematically infinite for identical images (MSE of zero), so
/// that case gets its own variant rather than a NaN or an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Psnr {
    /// The two images are bit-identical over the compared channels
    Identical,
    /// PSNR in decibels
    Decibels(f64),
}

impl Psnr {
    /// The value as an `f64`, `f64::INFINITY` for identical images.
    pub fn as_db(&self) -> f64 {
        match self {
            Psnr::Identical => f64::INFINITY,
            Psnr::Decibels(db) => *db,
        }
    }
}

impl std::fmt::Display for Psnr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Psnr::Identical => write!(f, "inf"),
            Psnr::Decibels(db) => write!(f, "{db}"),
        }
    }
}

/// Aggregated SSIM over all windows of an image pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SsimScore {
    /// Arithmetic mean of the per-window SSIM values
    pub mean: f64,

    /// Minimum per-window SSIM value
    pub min: f64,

    /// Sample variance of the per-window SSIM values
    pub variance: f64,
}

/// Reviewer verdict for a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ManualCheck {
    /// Not manually checked (yet)
    #[default]
    Unknown,
    /// Explicitly passed a manual check
    Ok,
    /// Explicitly failed a manual check
    Fail,
}

impl std::fmt::Display for ManualCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManualCheck::Unknown => write!(f, "UNKNOWN"),
            ManualCheck::Ok => write!(f, "OK"),
            ManualCheck::Fail => write!(f, "FAIL"),
        }
    }
}

/// Metrics computed for one image pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PairMetrics {
    pub psnr: Psnr,
    pub ssim: SsimScore,
}

/// Per-file load record for a one-shot comparison report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLoad {
    /// Absolute path to the file
    pub path: PathBuf,

    /// Wall-clock decode time in milliseconds
    pub load_time_ms: u64,
}

/// Output of a one-shot two-file comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Library version that produced the report
    pub version: String,

    /// The two input files with their load times
    pub files: Vec<FileLoad>,

    /// PSNR, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psnr: Option<Psnr>,

    /// PSNR computation time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub psnr_calc_ms: Option<u64>,

    /// SSIM, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssim: Option<SsimScore>,

    /// SSIM computation time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssim_calc_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psnr_display() {
        assert_eq!(Psnr::Identical.to_string(), "inf");
        assert_eq!(Psnr::Decibels(42.5).to_string(), "42.5");
        assert!(Psnr::Identical.as_db().is_infinite());
    }

    #[test]
    fn test_manual_check_display() {
        assert_eq!(ManualCheck::default().to_string(), "UNKNOWN");
        assert_eq!(ManualCheck::Ok.to_string(), "OK");
        assert_eq!(ManualCheck::Fail.to_string(), "FAIL");
    }

    #[test]
    fn test_pixel_buffer_shape() {
        let a = PixelBuffer {
            width: 2,
            height: 3,
            greyscale: false,
            samples: vec![0; 18],
        };
        let b = PixelBuffer {
            width: 3,
            height: 2,
            greyscale: false,
            samples: vec![0; 18],
        };
        assert_eq!(a.pixel_count(), 6);
        assert!(!a.same_shape(&b));
        assert!(a.same_shape(&a.clone()));
    }

    #[test]
    fn test_report_serde_skips_missing_metrics() {
        let report = ComparisonReport {
            version: "3.0.0".to_string(),
            files: vec![],
            psnr: Some(Psnr::Decibels(30.0)),
            psnr_calc_ms: Some(1),
            ssim: None,
            ssim_calc_ms: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("psnr"));
        assert!(!json.contains("ssim"));
        let parsed: ComparisonReport = serde_json::from_str(&json).unwrap();
        assert!(parsed.ssim.is_none());
    }
}
