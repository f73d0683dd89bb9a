//! Error types for the Dissimilar comparison pipeline.
//!
//! Errors are organized by layer: configuration problems, and pipeline
//! failures that carry the file path and enough context to report which
//! side of a comparison went wrong.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Dissimilar operations.
#[derive(Error, Debug)]
pub enum DissimilarError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Comparison pipeline errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Comparison pipeline errors.
///
/// `Decode`, `Timeout` and `External` all mean the same thing to a caller
/// (the image could not be turned into pixels) but keep their causes apart
/// for reporting.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Image decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Decode did not finish within the configured deadline
    #[error("Decode timeout for {path} after {timeout_ms}ms")]
    Timeout { path: PathBuf, timeout_ms: u64 },

    /// External decoder subprocess exited unsuccessfully
    #[error("External decoder failed for {path}: {message}")]
    External { path: PathBuf, message: String },

    /// The two images differ in shape, so the comparison is undefined
    #[error("Dimension mismatch: {one_width}x{one_height} vs {two_width}x{two_height}")]
    DimensionMismatch {
        one_width: u32,
        one_height: u32,
        two_width: u32,
        two_height: u32,
    },

    /// Image dimensions exceed the configured limit
    #[error("Image too large: {path} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Writing the SSIM heatmap artifact failed
    #[error("Heatmap write failed for {path}: {message}")]
    HeatmapWrite { path: PathBuf, message: String },
}

/// Convenience type alias for Dissimilar results.
pub type Result<T> = std::result::Result<T, DissimilarError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Whether this error originates from failing to load a file
    /// (as opposed to a shape mismatch between two loaded images).
    pub fn is_decode_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::Decode { .. }
                | PipelineError::Timeout { .. }
                | PipelineError::External { .. }
                | PipelineError::ImageTooLarge { .. }
                | PipelineError::FileNotFound(_)
        )
    }

    /// The file the error refers to, when there is one.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            PipelineError::Decode { path, .. }
            | PipelineError::Timeout { path, .. }
            | PipelineError::External { path, .. }
            | PipelineError::ImageTooLarge { path, .. }
            | PipelineError::HeatmapWrite { path, .. } => Some(path.as_path()),
            PipelineError::FileNotFound(path) => Some(path.as_path()),
            PipelineError::DimensionMismatch { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_message() {
        let err = PipelineError::DimensionMismatch {
            one_width: 10,
            one_height: 10,
            two_width: 12,
            two_height: 12,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: 10x10 vs 12x12");
        assert!(!err.is_decode_failure());
        assert!(err.path().is_none());
    }

    #[test]
    fn test_decode_failure_classification() {
        let err = PipelineError::Timeout {
            path: PathBuf::from("/a.jp2"),
            timeout_ms: 30000,
        };
        assert!(err.is_decode_failure());
        assert_eq!(err.path().unwrap(), std::path::Path::new("/a.jp2"));
    }
}
